//! WPI packet encryption and decryption
//!
//! Orchestrates the per-packet WPI construction: the 18-byte IV is built
//! from the key index and the 16-byte packet number (PN), the AAD is derived
//! from the frame's MAC header with volatile bits masked out, the MIC is
//! computed with CBC-MAC under the integrity check key, and the payload plus
//! MIC are masked as one buffer with the OFB keystream under the encryption
//! key:
//!
//! ```text
//! MIC  = CBC-MAC(ICK, PN, AAD ∥ plaintext)
//! body = OFB(EK, PN, plaintext ∥ MIC)
//! ```
//!
//! Decryption is provisional: recovered plaintext is released to the caller
//! only after the recomputed MIC matches in constant time. On any failure
//! the output is all-or-nothing.
//!
//! Reference: GB 15629.11 (WAPI WPI)

use thiserror::Error;

use crate::cbc_mac::{cbc_mac, verify_mic, MacError, AAD_MAX_LEN, AAD_MIN_LEN, MIC_SIZE};
use crate::ofb::{ofb_apply, OfbError};
pub use crate::ofb::MAX_MPDU_SIZE;
use crate::sms4::{Block, Sms4RoundKeys};

/// WPI IV size in bytes: key index, reserved byte, 16-byte PN
pub const IV_SIZE: usize = 18;

/// Packet number size in bytes
pub const PN_SIZE: usize = 16;

/// Maximum plaintext payload size in bytes
pub const MAX_PLAINTEXT_SIZE: usize = MAX_MPDU_SIZE - MIC_SIZE;

/// Frame-control byte 0: low three bits of the frame-subtype field
const FC0_SUBTYPE_LOW_MASK: u8 = 0x70;

/// Frame-control byte 1: Retry, Power-Management, and More-Data flags
const FC1_RETRY: u8 = 0x08;
const FC1_PWR_MGMT: u8 = 0x10;
const FC1_MORE_DATA: u8 = 0x20;

/// WPI error taxonomy
///
/// Mirrors the protocol's four-way split: malformed encrypt input,
/// structural decrypt failure, integrity failure, and keystream invariant
/// violation. The session layer adds key-selection and replay conditions.
/// The integrity failure is the security-critical path and is never
/// conflated with structural decrypt errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WpiError {
    /// Plaintext cannot fit in an MPDU together with the MIC
    #[error("plaintext length {0} exceeds the {MAX_PLAINTEXT_SIZE}-byte WPI payload limit")]
    PlaintextTooLarge(usize),
    /// MAC header slice has the wrong length for AAD derivation
    #[error("MAC header length {0} outside the 32..=34 byte AAD range")]
    InvalidHeaderLength(usize),
    /// Wire IV is not exactly 18 bytes
    #[error("IV length {0}, expected {IV_SIZE} bytes")]
    InvalidIvLength(usize),
    /// Ciphertext cannot contain a MIC
    #[error("ciphertext length {0} too short to contain a {MIC_SIZE}-byte MIC")]
    CiphertextTooShort(usize),
    /// Ciphertext exceeds the MPDU ceiling
    #[error("MPDU length {0} exceeds the {MAX_MPDU_SIZE}-byte ceiling")]
    MpduTooLarge(usize),
    /// Integrity check failed; the packet must be dropped and no plaintext
    /// is surfaced
    #[error("MIC verification failed")]
    MicVerificationFailed,
    /// Keystream engine invariant violation
    #[error(transparent)]
    Ofb(#[from] OfbError),
    /// No key pair installed for the security association
    #[error("no active key installed")]
    NoActiveKey,
    /// IV key index matches neither the active nor a still-valid old key
    #[error("unknown or expired key index {0}")]
    UnknownKeyIndex(u8),
    /// Received PN is not greater than the last accepted PN for its key
    #[error("packet number not greater than the last accepted PN")]
    ReplayDetected,
    /// Transmit PN space exhausted; rekey required
    #[error("transmit packet number space exhausted")]
    PnExhausted,
}

impl From<MacError> for WpiError {
    fn from(err: MacError) -> Self {
        match err {
            MacError::InvalidAadLength(len) => WpiError::InvalidHeaderLength(len),
            MacError::VerificationFailed => WpiError::MicVerificationFailed,
        }
    }
}

/// WPI per-packet IV
///
/// Wire format (18 bytes):
/// ```text
/// | key index (1) | reserved (1, zero) | PN (16, big-endian) |
/// ```
///
/// The reserved byte must be zero on encode and is preserved as received on
/// decode. One IV exists per packet and is never reused for two different
/// plaintexts under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WpiIv {
    /// Key index selecting the key generation
    pub key_index: u8,
    /// Reserved byte (zero on encode, preserved on decode)
    pub reserved: u8,
    /// 16-byte big-endian packet number
    pub pn: [u8; PN_SIZE],
}

impl WpiIv {
    /// Build a fresh IV for transmission
    pub fn new(key_index: u8, pn: u128) -> Self {
        WpiIv {
            key_index,
            reserved: 0,
            pn: pn.to_be_bytes(),
        }
    }

    /// Packet number as an integer
    pub fn pn(&self) -> u128 {
        u128::from_be_bytes(self.pn)
    }

    /// Packet number as the 16-byte cipher-layer IV block
    ///
    /// This block seeds both the CBC-MAC chain and the OFB register.
    pub fn pn_block(&self) -> &Block {
        &self.pn
    }

    /// Encode to the 18-byte wire form
    pub fn to_bytes(&self) -> [u8; IV_SIZE] {
        let mut out = [0u8; IV_SIZE];
        out[0] = self.key_index;
        out[1] = self.reserved;
        out[2..].copy_from_slice(&self.pn);
        out
    }

    /// Parse from the 18-byte wire form
    pub fn parse(bytes: &[u8]) -> Result<Self, WpiError> {
        if bytes.len() != IV_SIZE {
            return Err(WpiError::InvalidIvLength(bytes.len()));
        }

        let mut pn = [0u8; PN_SIZE];
        pn.copy_from_slice(&bytes[2..]);
        Ok(WpiIv {
            key_index: bytes[0],
            reserved: bytes[1],
            pn,
        })
    }
}

/// Derive the AAD from a frame's MAC header
///
/// The header slice is the 32–34 byte MAC header fragment (34 bytes when the
/// optional QoS control field is present). Bits that may legitimately change
/// across retransmissions are zeroed before inclusion: the low three bits of
/// the frame-subtype field and the Retry, Power-Management, and More-Data
/// flags.
pub fn build_aad(header: &[u8]) -> Result<Vec<u8>, WpiError> {
    if !(AAD_MIN_LEN..=AAD_MAX_LEN).contains(&header.len()) {
        return Err(WpiError::InvalidHeaderLength(header.len()));
    }

    let mut aad = header.to_vec();
    aad[0] &= !FC0_SUBTYPE_LOW_MASK;
    aad[1] &= !(FC1_RETRY | FC1_PWR_MGMT | FC1_MORE_DATA);
    Ok(aad)
}

/// Encrypt a frame payload under WPI
///
/// # Arguments
/// * `ek_keys` - Round-key schedule for the encryption key
/// * `ick_keys` - Round-key schedule for the integrity check key
/// * `iv` - Per-packet IV (fresh PN, never reused under a key)
/// * `header` - 32–34 byte MAC header fragment for AAD derivation
/// * `plaintext` - Frame payload
///
/// # Returns
/// The OFB-masked `plaintext ∥ MIC` body (payload length + 16 bytes).
pub fn packet_encrypt(
    ek_keys: &Sms4RoundKeys,
    ick_keys: &Sms4RoundKeys,
    iv: &WpiIv,
    header: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, WpiError> {
    if plaintext.len() > MAX_PLAINTEXT_SIZE {
        return Err(WpiError::PlaintextTooLarge(plaintext.len()));
    }

    let aad = build_aad(header)?;
    let mic = cbc_mac(ick_keys, iv.pn_block(), &aad, plaintext)?;

    let mut body = Vec::with_capacity(plaintext.len() + MIC_SIZE);
    body.extend_from_slice(plaintext);
    body.extend_from_slice(&mic);
    ofb_apply(ek_keys, iv.pn_block(), &mut body)?;

    Ok(body)
}

/// Decrypt a WPI-protected frame body
///
/// The body is OFB-unmasked, the MIC is recomputed over the AAD and the
/// recovered plaintext, and the plaintext is released only if the MIC
/// matches in constant time. On `MicVerificationFailed` the provisional
/// plaintext is discarded.
///
/// # Returns
/// The recovered plaintext (body length − 16 bytes).
pub fn packet_decrypt(
    ek_keys: &Sms4RoundKeys,
    ick_keys: &Sms4RoundKeys,
    iv: &WpiIv,
    header: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, WpiError> {
    if ciphertext.len() < MIC_SIZE {
        return Err(WpiError::CiphertextTooShort(ciphertext.len()));
    }
    if ciphertext.len() > MAX_MPDU_SIZE {
        return Err(WpiError::MpduTooLarge(ciphertext.len()));
    }

    let aad = build_aad(header)?;

    let mut body = ciphertext.to_vec();
    ofb_apply(ek_keys, iv.pn_block(), &mut body)?;

    let split = body.len() - MIC_SIZE;
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&body[split..]);

    verify_mic(ick_keys, iv.pn_block(), &aad, &body[..split], &mic)?;

    body.truncate(split);
    Ok(body)
}
