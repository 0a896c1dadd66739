//! WAPI packet protection algorithms
//!
//! Implements the WPI (WLAN Privacy Infrastructure) security suite:
//! - SMS4 block cipher (key expansion, block encrypt/decrypt)
//! - CBC-MAC integrity over header-derived AAD and payload
//! - OFB keystream confidentiality for payload and MIC
//! - Per-association key lifetime and packet number management
//!
//! Reference: GB 15629.11 (WAPI) and the SM4 cipher standard (GB/T 32907)

pub mod cbc_mac;
pub mod ofb;
pub mod session;
pub mod sms4;
pub mod wpi;

pub use cbc_mac::{cbc_mac, verify_mic, MacError};
pub use ofb::{ofb_apply, OfbError};
pub use session::WpiSecurityContext;
pub use sms4::Sms4RoundKeys;
pub use wpi::{packet_decrypt, packet_encrypt, WpiError, WpiIv};
