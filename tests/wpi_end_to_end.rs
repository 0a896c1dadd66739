//! End-to-end WPI flow over the public API: two peers sharing negotiated
//! EK/ICK pairs exchange protected frames through a rekey.

use std::time::Duration;

use wapi_crypto::{packet_decrypt, packet_encrypt, Sms4RoundKeys, WpiError, WpiIv,
    WpiSecurityContext};

const EK: [u8; 16] = [
    0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
    0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10,
];
const ICK: [u8; 16] = [
    0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10,
    0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
];

fn data_frame_header() -> [u8; 34] {
    let mut header = [0u8; 34];
    header[0] = 0x88; // QoS data frame
    header[1] = 0x41; // to-DS, protected
    header[4..10].copy_from_slice(&[0x00, 0x1f, 0x3a, 0x62, 0x9c, 0x01]); // addr1
    header[10..16].copy_from_slice(&[0x00, 0x1f, 0x3a, 0x62, 0x9c, 0x02]); // addr2
    header[16..22].copy_from_slice(&[0x00, 0x1f, 0x3a, 0x62, 0x9c, 0x03]); // addr3
    header
}

#[test]
fn test_peer_to_peer_exchange() {
    let header = data_frame_header();

    let mut sender = WpiSecurityContext::new();
    let mut receiver = WpiSecurityContext::new();
    sender.install_key(0, &EK, &ICK);
    receiver.install_key(0, &EK, &ICK);

    for i in 0u32..8 {
        let payload = format!("frame number {i}").into_bytes();
        let (iv, body) = sender.protect(&header, &payload).unwrap();
        assert_eq!(iv.pn(), (i + 1) as u128);

        let recovered = receiver.unprotect(&header, &iv.to_bytes(), &body).unwrap();
        assert_eq!(recovered, payload);
    }
}

#[test]
fn test_exchange_survives_rekey() {
    let header = data_frame_header();

    let mut sender = WpiSecurityContext::new();
    let mut receiver = WpiSecurityContext::new();
    sender.install_key(0, &EK, &ICK);
    receiver.install_key(0, &EK, &ICK);

    // In-flight frame under the old generation
    let (old_iv, old_body) = sender.protect(&header, b"in flight").unwrap();

    let new_ek = [0x5a; 16];
    let new_ick = [0xa5; 16];
    sender.install_key(1, &new_ek, &new_ick);
    receiver.install_key(1, &new_ek, &new_ick);

    // New-generation traffic flows
    let (iv, body) = sender.protect(&header, b"fresh keys").unwrap();
    assert_eq!(iv.key_index, 1);
    assert_eq!(
        receiver.unprotect(&header, &iv.to_bytes(), &body).unwrap(),
        b"fresh keys"
    );

    // The in-flight frame still decrypts inside the grace window
    assert_eq!(
        receiver
            .unprotect(&header, &old_iv.to_bytes(), &old_body)
            .unwrap(),
        b"in flight"
    );
}

#[test]
fn test_replayed_frame_dropped_by_receiver() {
    let header = data_frame_header();

    let mut sender = WpiSecurityContext::new();
    let mut receiver = WpiSecurityContext::new();
    sender.install_key(0, &EK, &ICK);
    receiver.install_key(0, &EK, &ICK);

    let (iv, body) = sender.protect(&header, b"once only").unwrap();
    assert!(receiver.unprotect(&header, &iv.to_bytes(), &body).is_ok());
    assert_eq!(
        receiver.unprotect(&header, &iv.to_bytes(), &body),
        Err(WpiError::ReplayDetected)
    );
}

#[test]
fn test_expired_grace_window_drops_old_generation() {
    let header = data_frame_header();

    let mut sender = WpiSecurityContext::new();
    let mut receiver =
        WpiSecurityContext::new().with_old_key_lifetime(Duration::from_millis(0));
    sender.install_key(0, &EK, &ICK);
    receiver.install_key(0, &EK, &ICK);

    let (old_iv, old_body) = sender.protect(&header, b"too late").unwrap();

    let new_ek = [0x5a; 16];
    let new_ick = [0xa5; 16];
    receiver.install_key(1, &new_ek, &new_ick);

    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(
        receiver.unprotect(&header, &old_iv.to_bytes(), &old_body),
        Err(WpiError::UnknownKeyIndex(0))
    );
}

#[test]
fn test_stateless_packet_api_matches_session_api() {
    let header = data_frame_header();

    let ek_keys = Sms4RoundKeys::expand(&EK);
    let ick_keys = Sms4RoundKeys::expand(&ICK);

    let mut sender = WpiSecurityContext::new();
    sender.install_key(0, &EK, &ICK);

    let (iv, body) = sender.protect(&header, b"same bytes").unwrap();

    // The stateless API with the same IV produces the identical wire body
    let direct = packet_encrypt(&ek_keys, &ick_keys, &iv, &header, b"same bytes").unwrap();
    assert_eq!(direct, body);

    let recovered = packet_decrypt(&ek_keys, &ick_keys, &iv, &header, &body).unwrap();
    assert_eq!(recovered, b"same bytes");
}

#[test]
fn test_corrupted_iv_pn_rejected() {
    let header = data_frame_header();

    let mut sender = WpiSecurityContext::new();
    let mut receiver = WpiSecurityContext::new();
    sender.install_key(0, &EK, &ICK);
    receiver.install_key(0, &EK, &ICK);

    let (iv, body) = sender.protect(&header, b"payload").unwrap();

    // Corrupting the PN desynchronizes both keystream and MIC
    let mut iv_bytes = iv.to_bytes();
    iv_bytes[17] ^= 0x01;
    let parsed = WpiIv::parse(&iv_bytes).unwrap();
    assert_ne!(parsed.pn(), iv.pn());
    assert_eq!(
        receiver.unprotect(&header, &iv_bytes, &body),
        Err(WpiError::MicVerificationFailed)
    );
}
