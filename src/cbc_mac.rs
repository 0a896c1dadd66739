//! SMS4 CBC-MAC integrity engine for WPI
//!
//! Computes the 16-byte Message Integrity Code (MIC) over the concatenation
//! of the header-derived AAD and the frame payload, using the SMS4 block
//! cipher keyed by the integrity check key (ICK) in CBC chaining mode. The
//! chain is seeded from the per-packet IV block, so the MIC binds the packet
//! number as well as the authenticated data.
//!
//! Padding convention: `AAD ∥ plaintext` is zero-padded to the 16-byte block
//! boundary before chaining. The padding is never transmitted; only the
//! declared AAD and payload lengths are covered by the caller's framing.
//!
//! Reference: GB 15629.11 (WAPI WPI)

use thiserror::Error;

use crate::sms4::{encrypt_block, Block, Sms4RoundKeys, BLOCK_SIZE};

/// MIC size in bytes (one cipher block)
pub const MIC_SIZE: usize = 16;

/// Minimum AAD length in bytes
pub const AAD_MIN_LEN: usize = 32;

/// Maximum AAD length in bytes (with the optional QoS control field)
pub const AAD_MAX_LEN: usize = 34;

/// CBC-MAC errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MacError {
    /// AAD length outside the protocol-declared 32..=34 byte range
    #[error("AAD length {0} outside the {AAD_MIN_LEN}..={AAD_MAX_LEN} byte range")]
    InvalidAadLength(usize),
    /// Computed MIC does not match the received MIC
    #[error("MIC verification failed")]
    VerificationFailed,
}

/// Compute the WPI MIC over `aad ∥ plaintext`
///
/// # Arguments
/// * `ick_keys` - Round-key schedule expanded from the integrity check key
/// * `iv` - 16-byte per-packet IV block (the PN field of the WPI IV)
/// * `aad` - Additional authenticated data derived from the frame header
/// * `plaintext` - Frame payload before encryption
///
/// # Returns
/// The 16-byte MIC, or `MacError::InvalidAadLength` if the AAD is out of
/// bounds.
pub fn cbc_mac(
    ick_keys: &Sms4RoundKeys,
    iv: &Block,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Block, MacError> {
    if aad.len() < AAD_MIN_LEN || aad.len() > AAD_MAX_LEN {
        return Err(MacError::InvalidAadLength(aad.len()));
    }

    // AAD ∥ plaintext, zero-padded to the block boundary
    let total = aad.len() + plaintext.len();
    let mut input = Vec::with_capacity(total.next_multiple_of(BLOCK_SIZE));
    input.extend_from_slice(aad);
    input.extend_from_slice(plaintext);
    input.resize(total.next_multiple_of(BLOCK_SIZE), 0);

    // CBC chain seeded from the IV block
    let mut reg = *iv;
    for chunk in input.chunks_exact(BLOCK_SIZE) {
        for (r, b) in reg.iter_mut().zip(chunk.iter()) {
            *r ^= b;
        }
        reg = encrypt_block(ick_keys, &reg);
    }

    Ok(reg)
}

/// Verify a received MIC against `aad ∥ plaintext`
///
/// The comparison is constant-time so that MIC verification leaks no timing
/// information about the position of the first mismatching byte.
///
/// # Returns
/// * `Ok(())` if the MIC matches
/// * `Err(MacError::VerificationFailed)` on mismatch
pub fn verify_mic(
    ick_keys: &Sms4RoundKeys,
    iv: &Block,
    aad: &[u8],
    plaintext: &[u8],
    received_mic: &[u8; MIC_SIZE],
) -> Result<(), MacError> {
    let computed = cbc_mac(ick_keys, iv, aad, plaintext)?;

    if constant_time_compare(&computed, received_mic) {
        Ok(())
    } else {
        Err(MacError::VerificationFailed)
    }
}

/// Constant-time comparison of two byte slices
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
