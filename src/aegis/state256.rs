//! AEGIS-256 family engine (256, 256X2, 256X4 by lane degree).
//!
//! Six wide state blocks, a rate of one block per update, 256-bit keys
//! and nonces split into two halves.

use super::block::AesBlock;
use crate::primitives::verify::{verify_16, verify_32};

const C0: [u8; 16] = [
    0x00, 0x01, 0x01, 0x02, 0x03, 0x05, 0x08, 0x0d, 0x15, 0x22, 0x37, 0x59, 0x90, 0xe9, 0x79, 0x62,
];
const C1: [u8; 16] = [
    0xdb, 0x3d, 0x18, 0x55, 0x6d, 0xc2, 0x2f, 0xf1, 0x20, 0x11, 0x31, 0x42, 0x73, 0xb5, 0x28, 0xdd,
];

struct State256<B: AesBlock> {
    s: [B; 6],
}

impl<B: AesBlock> State256<B> {
    const RATE: usize = B::WIDTH;

    #[inline(always)]
    fn new(key: &[u8], nonce: &[u8]) -> Self {
        debug_assert_eq!(key.len(), 32);
        debug_assert_eq!(nonce.len(), 32);

        let c0 = B::broadcast(&C0);
        let c1 = B::broadcast(&C1);
        let k0 = B::broadcast(key[..16].try_into().expect("key half"));
        let k1 = B::broadcast(key[16..].try_into().expect("key half"));
        let n0 = B::broadcast(nonce[..16].try_into().expect("nonce half"));
        let n1 = B::broadcast(nonce[16..].try_into().expect("nonce half"));
        let kn0 = k0.xor(n0);
        let kn1 = k1.xor(n1);
        let ctx = B::context();

        let mut st = Self {
            s: [kn0, kn1, c1, c0, k0.xor(c0), k1.xor(c1)],
        };
        for _ in 0..4 {
            for d in [k0, k1, kn0, kn1] {
                st.s[3] = st.s[3].xor(ctx);
                st.s[5] = st.s[5].xor(ctx);
                st.update(d);
            }
        }
        st
    }

    #[inline(always)]
    fn update(&mut self, d: B) {
        let s = &mut self.s;
        let tmp = s[5];
        s[5] = s[4].round(s[5]);
        s[4] = s[3].round(s[4]);
        s[3] = s[2].round(s[3]);
        s[2] = s[1].round(s[2]);
        s[1] = s[0].round(s[1]);
        s[0] = tmp.round(s[0]).xor(d);
    }

    #[inline(always)]
    fn keystream(&self) -> B {
        let s = &self.s;
        s[5].xor(s[4]).xor(s[1]).xor(s[2].and(s[3]))
    }

    #[inline(always)]
    fn enc(&mut self, chunk: &mut [u8]) {
        let z = self.keystream();
        let m = B::load(chunk);
        m.xor(z).store(chunk);
        self.update(m);
    }

    #[inline(always)]
    fn enc_partial(&mut self, chunk: &mut [u8]) {
        let mut pad = [0u8; 64];
        pad[..chunk.len()].copy_from_slice(chunk);
        let z = self.keystream();
        let m = B::load(&pad[..B::WIDTH]);
        m.xor(z).store(&mut pad[..B::WIDTH]);
        chunk.copy_from_slice(&pad[..chunk.len()]);
        self.update(m);
    }

    #[inline(always)]
    fn dec(&mut self, chunk: &mut [u8]) {
        let z = self.keystream();
        let m = B::load(chunk).xor(z);
        m.store(chunk);
        self.update(m);
    }

    #[inline(always)]
    fn dec_partial(&mut self, chunk: &mut [u8]) {
        let len = chunk.len();
        let mut pad = [0u8; 64];
        pad[..len].copy_from_slice(chunk);
        let z = self.keystream();
        B::load(&pad[..B::WIDTH]).xor(z).store(&mut pad[..B::WIDTH]);
        chunk.copy_from_slice(&pad[..len]);
        for b in &mut pad[len..B::WIDTH] {
            *b = 0;
        }
        let m = B::load(&pad[..B::WIDTH]);
        self.update(m);
    }

    #[inline(always)]
    fn finalize(&mut self, ad_len: u64, msg_len: u64) {
        let t = B::lengths(ad_len << 3, msg_len << 3).xor(self.s[3]);
        for _ in 0..7 {
            self.update(t);
        }
    }

    #[inline(always)]
    fn mac16(&self) -> [u8; 16] {
        let s = &self.s;
        s[0].xor(s[1])
            .xor(s[2])
            .xor(s[3])
            .xor(s[4])
            .xor(s[5])
            .fold()
    }

    #[inline(always)]
    fn mac32(&self) -> [u8; 32] {
        let s = &self.s;
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&s[0].xor(s[1]).xor(s[2]).fold());
        out[16..].copy_from_slice(&s[3].xor(s[4]).xor(s[5]).fold());
        out
    }

    #[inline(always)]
    fn absorb_ad(&mut self, ad: &[u8]) {
        let rate = Self::RATE;
        let mut chunks = ad.chunks_exact(rate);
        for chunk in &mut chunks {
            let m = B::load(chunk);
            self.update(m);
        }
        let rem = chunks.remainder();
        if !rem.is_empty() {
            let mut pad = [0u8; 64];
            pad[..rem.len()].copy_from_slice(rem);
            let m = B::load(&pad[..rate]);
            self.update(m);
        }
    }

    #[inline(always)]
    fn write_mac(&self, mac: &mut [u8]) {
        match mac.len() {
            16 => mac.copy_from_slice(&self.mac16()),
            32 => mac.copy_from_slice(&self.mac32()),
            _ => unreachable!("MAC length validated by the public API"),
        }
    }
}

#[inline(always)]
pub(crate) fn encrypt_detached<B: AesBlock>(
    buf: &mut [u8],
    mac: &mut [u8],
    ad: &[u8],
    nonce: &[u8],
    key: &[u8],
) {
    let rate = State256::<B>::RATE;
    let mut st = State256::<B>::new(key, nonce);
    st.absorb_ad(ad);
    let full = buf.len() - buf.len() % rate;
    for chunk in buf[..full].chunks_exact_mut(rate) {
        st.enc(chunk);
    }
    if full < buf.len() {
        st.enc_partial(&mut buf[full..]);
    }
    st.finalize(ad.len() as u64, buf.len() as u64);
    st.write_mac(mac);
}

#[inline(always)]
pub(crate) fn decrypt_detached<B: AesBlock>(
    buf: &mut [u8],
    mac: &[u8],
    ad: &[u8],
    nonce: &[u8],
    key: &[u8],
) -> bool {
    let rate = State256::<B>::RATE;
    let mut st = State256::<B>::new(key, nonce);
    st.absorb_ad(ad);
    let full = buf.len() - buf.len() % rate;
    for chunk in buf[..full].chunks_exact_mut(rate) {
        st.dec(chunk);
    }
    if full < buf.len() {
        st.dec_partial(&mut buf[full..]);
    }
    st.finalize(ad.len() as u64, buf.len() as u64);
    let ok = match mac.len() {
        16 => verify_16(&st.mac16(), mac.try_into().expect("16-byte tag")),
        32 => verify_32(&st.mac32(), mac.try_into().expect("32-byte tag")),
        _ => false,
    };
    if !ok {
        buf.fill(0);
    }
    ok
}

#[inline(always)]
pub(crate) fn encrypt_unauthenticated<B: AesBlock>(buf: &mut [u8], nonce: &[u8], key: &[u8]) {
    let rate = State256::<B>::RATE;
    let mut st = State256::<B>::new(key, nonce);
    let full = buf.len() - buf.len() % rate;
    for chunk in buf[..full].chunks_exact_mut(rate) {
        st.enc(chunk);
    }
    if full < buf.len() {
        st.enc_partial(&mut buf[full..]);
    }
}

#[inline(always)]
pub(crate) fn decrypt_unauthenticated<B: AesBlock>(buf: &mut [u8], nonce: &[u8], key: &[u8]) {
    let rate = State256::<B>::RATE;
    let mut st = State256::<B>::new(key, nonce);
    let full = buf.len() - buf.len() % rate;
    for chunk in buf[..full].chunks_exact_mut(rate) {
        st.dec(chunk);
    }
    if full < buf.len() {
        st.dec_partial(&mut buf[full..]);
    }
}

#[inline(always)]
pub(crate) fn stream<B: AesBlock>(out: &mut [u8], nonce: &[u8], key: &[u8]) {
    out.fill(0);
    encrypt_unauthenticated::<B>(out, nonce, key);
}
