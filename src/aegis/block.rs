//! The block abstraction every AEGIS backend implements.
//!
//! A block is `DEGREE` parallel 16-byte AES lanes; the parallel variants
//! (X2/X4) run the same schedule over wider blocks. Backends only supply
//! the five lane operations; the broadcast/fold helpers used during
//! initialisation and finalisation are derived and may go through
//! memory.

/// One wide AEGIS block: `DEGREE` AES lanes operated on in lockstep.
pub(crate) trait AesBlock: Copy {
    /// Number of parallel 16-byte lanes.
    const DEGREE: usize;
    /// Total block width in bytes (`16 * DEGREE`).
    const WIDTH: usize;

    fn zero() -> Self;
    /// Loads `WIDTH` bytes.
    fn load(bytes: &[u8]) -> Self;
    /// Stores `WIDTH` bytes.
    fn store(self, out: &mut [u8]);
    fn xor(self, other: Self) -> Self;
    fn and(self, other: Self) -> Self;
    /// One AES encryption round (SubBytes, ShiftRows, MixColumns, XOR
    /// round key) on every lane.
    fn round(self, round_key: Self) -> Self;

    /// The same 16 bytes repeated into every lane.
    #[inline(always)]
    fn broadcast(lane: &[u8; 16]) -> Self {
        let mut bytes = [0u8; 64];
        for d in 0..Self::DEGREE {
            bytes[d * 16..d * 16 + 16].copy_from_slice(lane);
        }
        Self::load(&bytes[..Self::WIDTH])
    }

    /// Finalisation length block: LE64 of the associated-data bit count
    /// followed by LE64 of the message bit count, in every lane.
    #[inline(always)]
    fn lengths(ad_bits: u64, msg_bits: u64) -> Self {
        let mut lane = [0u8; 16];
        lane[..8].copy_from_slice(&ad_bits.to_le_bytes());
        lane[8..].copy_from_slice(&msg_bits.to_le_bytes());
        Self::broadcast(&lane)
    }

    /// Lane-separation constant: byte 0 is the lane index, byte 1 the
    /// degree minus one. All-zero for the single-lane variants, which
    /// makes the XOR during initialisation a no-op there.
    #[inline(always)]
    fn context() -> Self {
        let mut bytes = [0u8; 64];
        for d in 0..Self::DEGREE {
            bytes[d * 16] = d as u8;
            bytes[d * 16 + 1] = (Self::DEGREE - 1) as u8;
        }
        Self::load(&bytes[..Self::WIDTH])
    }

    /// XOR-folds the lanes down to a single 16-byte value.
    #[inline(always)]
    fn fold(self) -> [u8; 16] {
        let mut bytes = [0u8; 64];
        self.store(&mut bytes[..Self::WIDTH]);
        let mut out = [0u8; 16];
        for d in 0..Self::DEGREE {
            for i in 0..16 {
                out[i] ^= bytes[d * 16 + i];
            }
        }
        out
    }
}
