//! SMS4 block cipher implementation
//!
//! SMS4 is the 128-bit block cipher used by the WAPI privacy infrastructure
//! (WPI) for wireless link-layer frame protection. It was later standardized
//! as SM4 (GB/T 32907). The cipher is a 32-round unbalanced Feistel network
//! over four 32-bit words; decryption uses the same round function with the
//! round keys consumed in reverse order.
//!
//! Reference: GB/T 32907 (SM4) and GB 15629.11 (WAPI)

/// Block size in bytes (128 bits)
pub const BLOCK_SIZE: usize = 16;

/// Key size in bytes (128 bits)
pub const KEY_SIZE: usize = 16;

/// Number of cipher rounds (and round keys)
pub const ROUNDS: usize = 32;

/// A single 16-byte cipher block
pub type Block = [u8; BLOCK_SIZE];

/// SMS4 S-box (tau transformation)
const SBOX: [u8; 256] = [
    0xd6, 0x90, 0xe9, 0xfe, 0xcc, 0xe1, 0x3d, 0xb7, 0x16, 0xb6, 0x14, 0xc2, 0x28, 0xfb, 0x2c, 0x05,
    0x2b, 0x67, 0x9a, 0x76, 0x2a, 0xbe, 0x04, 0xc3, 0xaa, 0x44, 0x13, 0x26, 0x49, 0x86, 0x06, 0x99,
    0x9c, 0x42, 0x50, 0xf4, 0x91, 0xef, 0x98, 0x7a, 0x33, 0x54, 0x0b, 0x43, 0xed, 0xcf, 0xac, 0x62,
    0xe4, 0xb3, 0x1c, 0xa9, 0xc9, 0x08, 0xe8, 0x95, 0x80, 0xdf, 0x94, 0xfa, 0x75, 0x8f, 0x3f, 0xa6,
    0x47, 0x07, 0xa7, 0xfc, 0xf3, 0x73, 0x17, 0xba, 0x83, 0x59, 0x3c, 0x19, 0xe6, 0x85, 0x4f, 0xa8,
    0x68, 0x6b, 0x81, 0xb2, 0x71, 0x64, 0xda, 0x8b, 0xf8, 0xeb, 0x0f, 0x4b, 0x70, 0x56, 0x9d, 0x35,
    0x1e, 0x24, 0x0e, 0x5e, 0x63, 0x58, 0xd1, 0xa2, 0x25, 0x22, 0x7c, 0x3b, 0x01, 0x21, 0x78, 0x87,
    0xd4, 0x00, 0x46, 0x57, 0x9f, 0xd3, 0x27, 0x52, 0x4c, 0x36, 0x02, 0xe7, 0xa0, 0xc4, 0xc8, 0x9e,
    0xea, 0xbf, 0x8a, 0xd2, 0x40, 0xc7, 0x38, 0xb5, 0xa3, 0xf7, 0xf2, 0xce, 0xf9, 0x61, 0x15, 0xa1,
    0xe0, 0xae, 0x5d, 0xa4, 0x9b, 0x34, 0x1a, 0x55, 0xad, 0x93, 0x32, 0x30, 0xf5, 0x8c, 0xb1, 0xe3,
    0x1d, 0xf6, 0xe2, 0x2e, 0x82, 0x66, 0xca, 0x60, 0xc0, 0x29, 0x23, 0xab, 0x0d, 0x53, 0x4e, 0x6f,
    0xd5, 0xdb, 0x37, 0x45, 0xde, 0xfd, 0x8e, 0x2f, 0x03, 0xff, 0x6a, 0x72, 0x6d, 0x6c, 0x5b, 0x51,
    0x8d, 0x1b, 0xaf, 0x92, 0xbb, 0xdd, 0xbc, 0x7f, 0x11, 0xd9, 0x5c, 0x41, 0x1f, 0x10, 0x5a, 0xd8,
    0x0a, 0xc1, 0x31, 0x88, 0xa5, 0xcd, 0x7b, 0xbd, 0x2d, 0x74, 0xd0, 0x12, 0xb8, 0xe5, 0xb4, 0xb0,
    0x89, 0x69, 0x97, 0x4a, 0x0c, 0x96, 0x77, 0x7e, 0x65, 0xb9, 0xf1, 0x09, 0xc5, 0x6e, 0xc6, 0x84,
    0x18, 0xf0, 0x7d, 0xec, 0x3a, 0xdc, 0x4d, 0x20, 0x79, 0xee, 0x5f, 0x3e, 0xd7, 0xcb, 0x39, 0x48,
];

/// System parameter FK, XORed word-wise with the master key before expansion
const FK: [u32; 4] = [0xa3b1bac6, 0x56aa3350, 0x677d9197, 0xb27022dc];

/// Fixed round constants CK for the key schedule
///
/// `CK[i]` byte `j` equals `(4*i + j) * 7 mod 256`.
const CK: [u32; 32] = [
    0x00070e15, 0x1c232a31, 0x383f464d, 0x545b6269,
    0x70777e85, 0x8c939aa1, 0xa8afb6bd, 0xc4cbd2d9,
    0xe0e7eef5, 0xfc030a11, 0x181f262d, 0x343b4249,
    0x50575e65, 0x6c737a81, 0x888f969d, 0xa4abb2b9,
    0xc0c7ced5, 0xdce3eaf1, 0xf8ff060d, 0x141b2229,
    0x30373e45, 0x4c535a61, 0x686f767d, 0x848b9299,
    0xa0a7aeb5, 0xbcc3cad1, 0xd8dfe6ed, 0xf4fb0209,
    0x10171e25, 0x2c333a41, 0x484f565d, 0x646b7279,
];

/// Byte-wise S-box substitution over a 32-bit word
#[inline]
fn tau(x: u32) -> u32 {
    ((SBOX[(x >> 24) as usize] as u32) << 24)
        | ((SBOX[((x >> 16) & 0xff) as usize] as u32) << 16)
        | ((SBOX[((x >> 8) & 0xff) as usize] as u32) << 8)
        | (SBOX[(x & 0xff) as usize] as u32)
}

/// Linear diffusion transform L used by the cipher rounds
#[inline]
fn l_cipher(x: u32) -> u32 {
    x ^ x.rotate_left(2) ^ x.rotate_left(10) ^ x.rotate_left(18) ^ x.rotate_left(24)
}

/// Linear transform L' used by the key schedule
#[inline]
fn l_schedule(x: u32) -> u32 {
    x ^ x.rotate_left(13) ^ x.rotate_left(23)
}

/// Round function T: S-box substitution followed by the cipher diffusion
#[inline]
fn t_cipher(x: u32) -> u32 {
    l_cipher(tau(x))
}

/// Key-schedule round function T': S-box substitution followed by L'
#[inline]
fn t_schedule(x: u32) -> u32 {
    l_schedule(tau(x))
}

/// Expanded SMS4 round-key schedule
///
/// Derived once per 128-bit master key and immutable afterwards, so a
/// schedule may be shared read-only across threads. Two independent
/// schedules exist per WPI security association: one for the encryption
/// key (EK) and one for the integrity check key (ICK).
#[derive(Clone)]
pub struct Sms4RoundKeys {
    rk: [u32; ROUNDS],
}

impl Sms4RoundKeys {
    /// Expand a 128-bit master key into 32 round keys
    ///
    /// The master key words are XORed with the system parameter FK, then
    /// driven through 32 rounds of the schedule round function with the
    /// fixed constants CK.
    pub fn expand(master_key: &[u8; KEY_SIZE]) -> Self {
        let mut k = [0u32; 4 + ROUNDS];
        for i in 0..4 {
            k[i] = u32::from_be_bytes([
                master_key[4 * i],
                master_key[4 * i + 1],
                master_key[4 * i + 2],
                master_key[4 * i + 3],
            ]) ^ FK[i];
        }

        let mut rk = [0u32; ROUNDS];
        for i in 0..ROUNDS {
            k[i + 4] = k[i] ^ t_schedule(k[i + 1] ^ k[i + 2] ^ k[i + 3] ^ CK[i]);
            rk[i] = k[i + 4];
        }

        Sms4RoundKeys { rk }
    }
}

impl std::fmt::Debug for Sms4RoundKeys {
    // Round keys are secret material; never print them.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sms4RoundKeys(..)")
    }
}

/// Run the 32-round cipher with round keys supplied in the given order
fn crypt_block(round_keys: impl Iterator<Item = u32>, input: &Block) -> Block {
    let mut x = [0u32; 4];
    for i in 0..4 {
        x[i] = u32::from_be_bytes([
            input[4 * i],
            input[4 * i + 1],
            input[4 * i + 2],
            input[4 * i + 3],
        ]);
    }

    for rk in round_keys {
        let t = x[0] ^ t_cipher(x[1] ^ x[2] ^ x[3] ^ rk);
        x[0] = x[1];
        x[1] = x[2];
        x[2] = x[3];
        x[3] = t;
    }

    // Final reverse transform: output words in reverse order
    let mut out = [0u8; BLOCK_SIZE];
    out[0..4].copy_from_slice(&x[3].to_be_bytes());
    out[4..8].copy_from_slice(&x[2].to_be_bytes());
    out[8..12].copy_from_slice(&x[1].to_be_bytes());
    out[12..16].copy_from_slice(&x[0].to_be_bytes());
    out
}

/// Encrypt a single 16-byte block
pub fn encrypt_block(keys: &Sms4RoundKeys, input: &Block) -> Block {
    crypt_block(keys.rk.iter().copied(), input)
}

/// Decrypt a single 16-byte block
///
/// Identical round structure to encryption with the round keys consumed
/// in reverse order.
pub fn decrypt_block(keys: &Sms4RoundKeys, input: &Block) -> Block {
    crypt_block(keys.rk.iter().rev().copied(), input)
}
