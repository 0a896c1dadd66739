//! SMS4 OFB keystream engine for WPI
//!
//! Produces the WPI confidentiality keystream by repeatedly encrypting a
//! 16-byte register seeded from the per-packet IV block, XORing each
//! keystream block into the data. In OFB mode the next register value is the
//! keystream block itself, not the ciphertext, so encryption and decryption
//! are the same operation and the last chunk may be partial.
//!
//! OFB provides no authenticity of its own; integrity comes solely from the
//! CBC-MAC stage. This engine therefore never fails on attacker-controlled
//! data, only on caller buffers that violate the MPDU ceiling the packet
//! layer is supposed to enforce first.
//!
//! Reference: GB 15629.11 (WAPI WPI)

use thiserror::Error;

use crate::sms4::{encrypt_block, Block, Sms4RoundKeys, BLOCK_SIZE};

/// Maximum MPDU size in bytes (protocol ceiling, payload plus MIC)
pub const MAX_MPDU_SIZE: usize = 2278;

/// OFB keystream errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OfbError {
    /// Buffer exceeds the MPDU ceiling; the packet layer should have
    /// rejected it before reaching the keystream engine
    #[error("buffer length {0} exceeds the {MAX_MPDU_SIZE}-byte MPDU ceiling")]
    OversizedBuffer(usize),
}

/// Apply the OFB keystream to `data` in place
///
/// # Arguments
/// * `ek_keys` - Round-key schedule expanded from the encryption key
/// * `iv` - 16-byte per-packet IV block (the PN field of the WPI IV)
/// * `data` - Payload plus MIC, encrypted or decrypted in place
///
/// # Note
/// Encryption and decryption are the identical operation.
pub fn ofb_apply(ek_keys: &Sms4RoundKeys, iv: &Block, data: &mut [u8]) -> Result<(), OfbError> {
    if data.len() > MAX_MPDU_SIZE {
        return Err(OfbError::OversizedBuffer(data.len()));
    }

    let mut reg = *iv;
    for chunk in data.chunks_mut(BLOCK_SIZE) {
        reg = encrypt_block(ek_keys, &reg);
        for (b, k) in chunk.iter_mut().zip(reg.iter()) {
            *b ^= k;
        }
    }

    Ok(())
}
