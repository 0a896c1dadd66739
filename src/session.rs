//! WPI security association state
//!
//! Tracks the per-association key material and packet-number state that the
//! packet orchestrator needs: the active EK/ICK key pair, an optional old
//! pair kept valid for a fixed grace window after rekey so in-flight packets
//! are not dropped, the transmit PN counter, and the highest accepted
//! receive PN per key generation for replay rejection.
//!
//! Key negotiation itself (WAI certificate authentication and key agreement)
//! is out of scope; the key-management collaborator installs negotiated
//! EK/ICK pairs via [`WpiSecurityContext::install_key`].
//!
//! # Concurrency
//!
//! Every cryptographic operation is a synchronous pure computation; this
//! context is the only shared mutable state per association and callers
//! should guard it with a single mutex. Expanded round-key schedules are
//! immutable and may be shared read-only across threads.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::sms4::{Sms4RoundKeys, KEY_SIZE};
use crate::wpi::{packet_decrypt, packet_encrypt, WpiError, WpiIv};

/// How long a superseded key pair remains valid for decryption after rekey
pub const OLD_KEY_LIFETIME: Duration = Duration::from_secs(60);

/// One installed key generation with its receive-side replay state
struct KeyGeneration {
    /// Key index carried in the IV of packets under this generation
    key_index: u8,
    /// Schedule for the encryption key
    ek_keys: Sms4RoundKeys,
    /// Schedule for the integrity check key
    ick_keys: Sms4RoundKeys,
    /// Highest PN accepted so far under this generation
    last_rx_pn: Option<u128>,
}

/// Per-association WPI security context
///
/// # Example
///
/// ```
/// use wapi_crypto::WpiSecurityContext;
///
/// let mut ctx = WpiSecurityContext::new();
/// ctx.install_key(0, &[0x11; 16], &[0x22; 16]);
///
/// let header = [0u8; 32];
/// let (iv, body) = ctx.protect(&header, b"payload").unwrap();
/// let plaintext = ctx.unprotect(&header, &iv.to_bytes(), &body).unwrap();
/// assert_eq!(plaintext, b"payload");
/// ```
pub struct WpiSecurityContext {
    /// Currently active key generation (used for all transmissions)
    active: Option<KeyGeneration>,
    /// Superseded generation and the instant it was replaced
    old: Option<(KeyGeneration, Instant)>,
    /// Transmit PN of the active generation; incremented before each packet
    tx_pn: u128,
    /// Grace window for the old generation
    old_key_lifetime: Duration,
}

impl WpiSecurityContext {
    /// Create a context with no keys installed
    pub fn new() -> Self {
        WpiSecurityContext {
            active: None,
            old: None,
            tx_pn: 0,
            old_key_lifetime: OLD_KEY_LIFETIME,
        }
    }

    /// Override the old-key grace window (the wire default is 60 seconds)
    pub fn with_old_key_lifetime(mut self, lifetime: Duration) -> Self {
        self.old_key_lifetime = lifetime;
        self
    }

    /// Whether a key pair is installed and usable for transmission
    pub fn has_active_key(&self) -> bool {
        self.active.is_some()
    }

    /// Key index of the active generation, if any
    pub fn active_key_index(&self) -> Option<u8> {
        self.active.as_ref().map(|generation| generation.key_index)
    }

    /// Install a freshly negotiated EK/ICK pair
    ///
    /// The previous active generation (if any) is retained for decryption
    /// for [`OLD_KEY_LIFETIME`] from this moment. PN state starts over for
    /// the new generation: the transmit PN resets and the first packet sent
    /// under the new keys carries PN 1.
    pub fn install_key(&mut self, key_index: u8, ek: &[u8; KEY_SIZE], ick: &[u8; KEY_SIZE]) {
        let generation = KeyGeneration {
            key_index,
            ek_keys: Sms4RoundKeys::expand(ek),
            ick_keys: Sms4RoundKeys::expand(ick),
            last_rx_pn: None,
        };

        if let Some(previous) = self.active.replace(generation) {
            debug!(
                old_key_index = previous.key_index,
                new_key_index = key_index,
                "rekey: previous generation retained for the grace window"
            );
            self.old = Some((previous, Instant::now()));
        } else {
            debug!(key_index, "initial key pair installed");
        }
        self.tx_pn = 0;
    }

    /// Drop all key material and PN state
    pub fn reset(&mut self) {
        self.active = None;
        self.old = None;
        self.tx_pn = 0;
    }

    /// Encrypt an outgoing frame payload
    ///
    /// Increments the transmit PN, embeds it in a fresh IV under the active
    /// key index, and runs the WPI encrypt path. The PN is committed only if
    /// encryption succeeds, so a rejected payload does not burn a PN.
    ///
    /// # Returns
    /// The per-packet IV (to be carried in the frame) and the OFB-masked
    /// `payload ∥ MIC` body.
    pub fn protect(
        &mut self,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<(WpiIv, Vec<u8>), WpiError> {
        let generation = self.active.as_ref().ok_or(WpiError::NoActiveKey)?;

        let next_pn = self.tx_pn.checked_add(1).ok_or(WpiError::PnExhausted)?;
        let iv = WpiIv::new(generation.key_index, next_pn);

        let body = packet_encrypt(
            &generation.ek_keys,
            &generation.ick_keys,
            &iv,
            header,
            plaintext,
        )?;

        self.tx_pn = next_pn;
        Ok((iv, body))
    }

    /// Decrypt and verify an incoming frame body
    ///
    /// Selects the key generation by the IV's key index (accepting the old
    /// generation within the grace window), rejects non-increasing PNs
    /// before any cryptographic work, and advances the accepted-PN
    /// watermark only after the MIC verifies.
    pub fn unprotect(
        &mut self,
        header: &[u8],
        iv_bytes: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, WpiError> {
        self.unprotect_at(Instant::now(), header, iv_bytes, ciphertext)
    }

    fn unprotect_at(
        &mut self,
        now: Instant,
        header: &[u8],
        iv_bytes: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, WpiError> {
        let iv = WpiIv::parse(iv_bytes)?;

        // Expired old generations are dropped eagerly
        if let Some((_, replaced_at)) = &self.old {
            if now.duration_since(*replaced_at) > self.old_key_lifetime {
                self.old = None;
            }
        }

        if self.active.is_none() {
            return Err(WpiError::NoActiveKey);
        }

        let generation = match &mut self.active {
            Some(generation) if generation.key_index == iv.key_index => generation,
            _ => match &mut self.old {
                Some((generation, _)) if generation.key_index == iv.key_index => generation,
                _ => {
                    warn!(key_index = iv.key_index, "packet for unknown or expired key index");
                    return Err(WpiError::UnknownKeyIndex(iv.key_index));
                }
            },
        };

        // Replay fast-path; the MIC check below remains authoritative
        let pn = iv.pn();
        if let Some(last) = generation.last_rx_pn {
            if pn <= last {
                warn!(pn, last, "replayed or reordered packet number rejected");
                return Err(WpiError::ReplayDetected);
            }
        }

        let plaintext = packet_decrypt(
            &generation.ek_keys,
            &generation.ick_keys,
            &iv,
            header,
            ciphertext,
        )
        .inspect_err(|err| {
            if matches!(err, WpiError::MicVerificationFailed) {
                warn!(pn, key_index = iv.key_index, "MIC verification failed, dropping packet");
            }
        })?;

        generation.last_rx_pn = Some(pn);
        Ok(plaintext)
    }
}

impl Default for WpiSecurityContext {
    fn default() -> Self {
        Self::new()
    }
}
