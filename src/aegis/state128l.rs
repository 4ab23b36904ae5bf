//! AEGIS-128L family engine (128L, 128X2, 128X4 by lane degree).
//!
//! Eight wide state blocks, a rate of two blocks per update. The
//! schedule is shared by every backend; the lane-separation context
//! turns one generic engine into the parallel X variants.

use super::block::AesBlock;
use crate::primitives::verify::{verify_16, verify_32};

const C0: [u8; 16] = [
    0x00, 0x01, 0x01, 0x02, 0x03, 0x05, 0x08, 0x0d, 0x15, 0x22, 0x37, 0x59, 0x90, 0xe9, 0x79, 0x62,
];
const C1: [u8; 16] = [
    0xdb, 0x3d, 0x18, 0x55, 0x6d, 0xc2, 0x2f, 0xf1, 0x20, 0x11, 0x31, 0x42, 0x73, 0xb5, 0x28, 0xdd,
];

struct State128L<B: AesBlock> {
    s: [B; 8],
}

impl<B: AesBlock> State128L<B> {
    const RATE: usize = 2 * B::WIDTH;

    #[inline(always)]
    fn new(key: &[u8], nonce: &[u8]) -> Self {
        debug_assert_eq!(key.len(), 16);
        debug_assert_eq!(nonce.len(), 16);
        let key: &[u8; 16] = key.try_into().expect("128-bit key");
        let nonce: &[u8; 16] = nonce.try_into().expect("128-bit nonce");

        let c0 = B::broadcast(&C0);
        let c1 = B::broadcast(&C1);
        let k = B::broadcast(key);
        let n = B::broadcast(nonce);
        let kn = k.xor(n);
        let ctx = B::context();

        let mut st = Self {
            s: [kn, c1, c0, c1, kn, k.xor(c0), k.xor(c1), k.xor(c0)],
        };
        for _ in 0..10 {
            st.s[3] = st.s[3].xor(ctx);
            st.s[7] = st.s[7].xor(ctx);
            st.update(n, k);
        }
        st
    }

    #[inline(always)]
    fn update(&mut self, d1: B, d2: B) {
        let s = &mut self.s;
        let tmp = s[7];
        s[7] = s[6].round(s[7]);
        s[6] = s[5].round(s[6]);
        s[5] = s[4].round(s[5]);
        s[4] = s[3].round(s[4]);
        s[3] = s[2].round(s[3]);
        s[2] = s[1].round(s[2]);
        s[1] = s[0].round(s[1]);
        s[0] = tmp.round(s[0]);
        s[0] = s[0].xor(d1);
        s[4] = s[4].xor(d2);
    }

    #[inline(always)]
    fn keystream(&self) -> (B, B) {
        let s = &self.s;
        let z0 = s[6].xor(s[1]).xor(s[2].and(s[3]));
        let z1 = s[2].xor(s[5]).xor(s[6].and(s[7]));
        (z0, z1)
    }

    #[inline(always)]
    fn absorb(&mut self, chunk: &[u8]) {
        let w = B::WIDTH;
        self.update(B::load(&chunk[..w]), B::load(&chunk[w..2 * w]));
    }

    #[inline(always)]
    fn enc(&mut self, chunk: &mut [u8]) {
        let w = B::WIDTH;
        let (z0, z1) = self.keystream();
        let m0 = B::load(&chunk[..w]);
        let m1 = B::load(&chunk[w..2 * w]);
        m0.xor(z0).store(&mut chunk[..w]);
        m1.xor(z1).store(&mut chunk[w..2 * w]);
        self.update(m0, m1);
    }

    #[inline(always)]
    fn enc_partial(&mut self, chunk: &mut [u8]) {
        let w = B::WIDTH;
        let mut pad = [0u8; 128];
        pad[..chunk.len()].copy_from_slice(chunk);
        let (z0, z1) = self.keystream();
        let m0 = B::load(&pad[..w]);
        let m1 = B::load(&pad[w..2 * w]);
        m0.xor(z0).store(&mut pad[..w]);
        m1.xor(z1).store(&mut pad[w..2 * w]);
        chunk.copy_from_slice(&pad[..chunk.len()]);
        self.update(m0, m1);
    }

    #[inline(always)]
    fn dec(&mut self, chunk: &mut [u8]) {
        let w = B::WIDTH;
        let (z0, z1) = self.keystream();
        let m0 = B::load(&chunk[..w]).xor(z0);
        let m1 = B::load(&chunk[w..2 * w]).xor(z1);
        m0.store(&mut chunk[..w]);
        m1.store(&mut chunk[w..2 * w]);
        self.update(m0, m1);
    }

    /// Decrypts a trailing partial chunk; the state absorbs the
    /// zero-padded plaintext, exactly as the encryptor produced it.
    #[inline(always)]
    fn dec_partial(&mut self, chunk: &mut [u8]) {
        let w = B::WIDTH;
        let len = chunk.len();
        let mut pad = [0u8; 128];
        pad[..len].copy_from_slice(chunk);
        let (z0, z1) = self.keystream();
        B::load(&pad[..w]).xor(z0).store(&mut pad[..w]);
        B::load(&pad[w..2 * w]).xor(z1).store(&mut pad[w..2 * w]);
        chunk.copy_from_slice(&pad[..len]);
        for b in &mut pad[len..2 * w] {
            *b = 0;
        }
        let m0 = B::load(&pad[..w]);
        let m1 = B::load(&pad[w..2 * w]);
        self.update(m0, m1);
    }

    #[inline(always)]
    fn finalize(&mut self, ad_len: u64, msg_len: u64) {
        let t = B::lengths(ad_len << 3, msg_len << 3).xor(self.s[2]);
        for _ in 0..7 {
            self.update(t, t);
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
            .xor(s[6])
            .fold()
    }

    #[inline(always)]
    fn mac32(&self) -> [u8; 32] {
        let s = &self.s;
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&s[0].xor(s[1]).xor(s[2]).xor(s[3]).fold());
        out[16..].copy_from_slice(&s[4].xor(s[5]).xor(s[6]).xor(s[7]).fold());
        out
    }

    #[inline(always)]
    fn absorb_ad(&mut self, ad: &[u8]) {
        let rate = Self::RATE;
        let mut chunks = ad.chunks_exact(rate);
        for chunk in &mut chunks {
            self.absorb(chunk);
        }
        let rem = chunks.remainder();
        if !rem.is_empty() {
            let mut pad = [0u8; 128];
            pad[..rem.len()].copy_from_slice(rem);
            self.absorb(&pad[..rate]);
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
    let rate = State128L::<B>::RATE;
    let mut st = State128L::<B>::new(key, nonce);
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
    let rate = State128L::<B>::RATE;
    let mut st = State128L::<B>::new(key, nonce);
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
    let rate = State128L::<B>::RATE;
    let mut st = State128L::<B>::new(key, nonce);
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
    let rate = State128L::<B>::RATE;
    let mut st = State128L::<B>::new(key, nonce);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aegis::soft::SoftBlock;

    fn hex_arr<const N: usize>(s: &str) -> [u8; N] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    // CFRG AEGIS draft, AEGIS-128L test vector 1.
    #[test]
    fn test_aegis128l_vector_1() {
        let key: [u8; 16] = hex_arr("10010000000000000000000000000000");
        let nonce: [u8; 16] = hex_arr("10000200000000000000000000000000");
        let mut msg = [0u8; 16];
        let mut mac = [0u8; 16];
        encrypt_detached::<SoftBlock<1>>(&mut msg, &mut mac, b"", &nonce, &key);
        assert_eq!(hex::encode(msg), "c1c0e58bd913006feba00f4b3cc3594e");
        assert_eq!(hex::encode(mac), "abe0ece80c24868a226a35d16bdae37a");

        let ok = decrypt_detached::<SoftBlock<1>>(&mut msg, &mac, b"", &nonce, &key);
        assert!(ok);
        assert_eq!(msg, [0u8; 16]);
    }

    // Same vector with the 256-bit tag.
    #[test]
    fn test_aegis128l_vector_1_tag256() {
        let key: [u8; 16] = hex_arr("10010000000000000000000000000000");
        let nonce: [u8; 16] = hex_arr("10000200000000000000000000000000");
        let mut msg = [0u8; 16];
        let mut mac = [0u8; 32];
        encrypt_detached::<SoftBlock<1>>(&mut msg, &mut mac, b"", &nonce, &key);
        assert_eq!(
            hex::encode(mac),
            "25835bfbb21632176cf03840687cb968cace4617af1bd0f7d064c639a5c79ee4"
        );
    }

    // CFRG AEGIS draft, AEGIS-128L test vector 2 (empty message).
    #[test]
    fn test_aegis128l_vector_2_empty() {
        let key: [u8; 16] = hex_arr("10010000000000000000000000000000");
        let nonce: [u8; 16] = hex_arr("10000200000000000000000000000000");
        let mut mac = [0u8; 16];
        encrypt_detached::<SoftBlock<1>>(&mut [], &mut mac, b"", &nonce, &key);
        assert_eq!(hex::encode(mac), "c2b879a67def9d74e6c14f708bbcc9b4");
    }

    #[test]
    fn test_tampered_tag_rejected_and_zeroed() {
        let key = [7u8; 16];
        let nonce = [9u8; 16];
        let mut msg = [0x5au8; 80];
        let mut mac = [0u8; 32];
        encrypt_detached::<SoftBlock<1>>(&mut msg, &mut mac, b"ad", &nonce, &key);
        mac[0] ^= 1;
        let ok = decrypt_detached::<SoftBlock<1>>(&mut msg, &mac, b"ad", &nonce, &key);
        assert!(!ok);
        assert_eq!(msg, [0u8; 80]);
    }

    #[test]
    fn test_parallel_lanes_roundtrip() {
        fn roundtrip<B: crate::aegis::block::AesBlock>() {
            let key = [0x13u8; 16];
            let nonce = [0x37u8; 16];
            let original: Vec<u8> = (0..517).map(|i| (i % 256) as u8).collect();
            let mut buf = original.clone();
            let mut mac = [0u8; 32];
            encrypt_detached::<B>(&mut buf, &mut mac, b"pages", &nonce, &key);
            assert_ne!(buf, original);
            assert!(decrypt_detached::<B>(&mut buf, &mac, b"pages", &nonce, &key));
            assert_eq!(buf, original);
        }
        roundtrip::<SoftBlock<1>>();
        roundtrip::<SoftBlock<2>>();
        roundtrip::<SoftBlock<4>>();
    }

    #[test]
    fn test_stream_matches_zero_encryption() {
        let key = [1u8; 16];
        let nonce = [2u8; 16];
        let mut a = [0xffu8; 96];
        stream::<SoftBlock<2>>(&mut a, &nonce, &key);
        let mut b = [0u8; 96];
        encrypt_unauthenticated::<SoftBlock<2>>(&mut b, &nonce, &key);
        assert_eq!(a, b);
    }
}
