//! Blob format: sealing and opening.
//!
//! Layout: `MAGIC(3) ‖ salt(16) ‖ iv(16) ‖ ciphertext(N) ‖ mac(32)`.
//!
//! The tag is HMAC-SHA256 over everything before it and is checked in
//! constant time before the ciphertext is touched. A blob too short to hold
//! the header and tag is `Malformed`; every other defect is
//! `WrongPinOrCorrupt`.

use aes::Aes256;
use common::Credentials;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::VaultError;

pub const MAGIC: &[u8; 3] = b"AV1";
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 32;
pub const KDF_ITERATIONS: u32 = 200_000;

const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + IV_LEN;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Encryption and MAC keys split from 64 bytes of PBKDF2 output.
#[derive(Zeroize, ZeroizeOnDrop)]
struct VaultKeys {
    enc: [u8; 32],
    mac: [u8; 32],
}

impl VaultKeys {
    fn derive(pin: &str, salt: &[u8]) -> Self {
        let mut material = Zeroizing::new([0u8; 64]);
        pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, KDF_ITERATIONS, &mut material[..]);

        let mut keys = VaultKeys {
            enc: [0u8; 32],
            mac: [0u8; 32],
        };
        keys.enc.copy_from_slice(&material[..32]);
        keys.mac.copy_from_slice(&material[32..]);
        keys
    }

    fn tag(&self, authenticated: &[u8]) -> Result<HmacSha256, VaultError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac)
            .map_err(|e| VaultError::Crypto(format!("HMAC key rejected: {e}")))?;
        mac.update(authenticated);
        Ok(mac)
    }

    fn apply_keystream(&self, iv: &[u8; IV_LEN], buf: &mut [u8]) {
        let mut cipher = Aes256Ctr::new(&self.enc.into(), &(*iv).into());
        cipher.apply_keystream(buf);
    }
}

fn check_pin(pin: &str) -> Result<(), VaultError> {
    if pin.is_empty() {
        return Err(VaultError::EmptyPin);
    }
    Ok(())
}

/// Encrypt the full credential mapping under `pin` with a fresh salt and IV.
pub fn seal(credentials: &Credentials, pin: &str) -> Result<Vec<u8>, VaultError> {
    check_pin(pin)?;

    let plaintext = Zeroizing::new(serde_json::to_vec(credentials).map_err(VaultError::Encode)?);

    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let keys = VaultKeys::derive(pin, &salt);
    seal_with_keys(&plaintext, &keys, &salt, &iv)
}

fn seal_with_keys(
    plaintext: &[u8],
    keys: &VaultKeys,
    salt: &[u8; SALT_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>, VaultError> {
    let mut blob = Vec::with_capacity(HEADER_LEN + plaintext.len() + TAG_LEN);
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(salt);
    blob.extend_from_slice(iv);

    let body_start = blob.len();
    blob.extend_from_slice(plaintext);
    keys.apply_keystream(iv, &mut blob[body_start..]);

    let tag = keys.tag(&blob)?.finalize().into_bytes();
    blob.extend_from_slice(&tag);
    Ok(blob)
}

/// Verify and decrypt a blob produced by [`seal`].
pub fn open(blob: &[u8], pin: &str) -> Result<Credentials, VaultError> {
    check_pin(pin)?;
    check_length(blob)?;

    // An altered magic can never verify; skip the KDF.
    if &blob[..MAGIC.len()] != MAGIC {
        return Err(VaultError::WrongPinOrCorrupt);
    }

    let salt = &blob[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let keys = VaultKeys::derive(pin, salt);
    open_with_keys(blob, &keys)
}

fn check_length(blob: &[u8]) -> Result<(), VaultError> {
    if blob.len() < HEADER_LEN + TAG_LEN {
        return Err(VaultError::Malformed(format!(
            "{} bytes is shorter than the {} byte minimum",
            blob.len(),
            HEADER_LEN + TAG_LEN
        )));
    }
    Ok(())
}

fn open_with_keys(blob: &[u8], keys: &VaultKeys) -> Result<Credentials, VaultError> {
    check_length(blob)?;

    let (authenticated, tag) = blob.split_at(blob.len() - TAG_LEN);
    keys.tag(authenticated)?
        .verify_slice(tag)
        .map_err(|_| VaultError::WrongPinOrCorrupt)?;

    if &authenticated[..MAGIC.len()] != MAGIC {
        return Err(VaultError::WrongPinOrCorrupt);
    }

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&authenticated[MAGIC.len() + SALT_LEN..HEADER_LEN]);

    let mut plaintext = Zeroizing::new(authenticated[HEADER_LEN..].to_vec());
    keys.apply_keystream(&iv, &mut plaintext);

    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Malformed(format!("credential payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CredentialSet, ExchangeId};

    fn sample() -> Credentials {
        let mut creds = Credentials::new();
        creds.insert(CredentialSet::new(ExchangeId::Binance, "bn-key", "bn-secret"));
        creds.insert(
            CredentialSet::new(ExchangeId::Okx, "okx-key", "okx-secret").with_passphrase("okx-pass"),
        );
        creds
    }

    #[test]
    fn test_round_trip() {
        let creds = sample();
        let blob = seal(&creds, "4821").unwrap();
        assert_eq!(open(&blob, "4821").unwrap(), creds);
    }

    #[test]
    fn test_round_trip_empty_mapping() {
        let creds = Credentials::new();
        let blob = seal(&creds, "0000").unwrap();
        assert_eq!(blob.len(), HEADER_LEN + b"{}".len() + TAG_LEN);
        assert!(open(&blob, "0000").unwrap().is_empty());
    }

    #[test]
    fn test_layout() {
        let blob = seal(&sample(), "4821").unwrap();
        assert_eq!(&blob[..3], b"AV1");
        let plaintext_len = serde_json::to_vec(&sample()).unwrap().len();
        assert_eq!(blob.len(), 3 + 16 + 16 + plaintext_len + 32);
        // Ciphertext must not leak the plaintext.
        let body = &blob[HEADER_LEN..blob.len() - TAG_LEN];
        assert!(!body.windows(6).any(|w| w == b"bn-key"));
    }

    #[test]
    fn test_fresh_salt_and_iv_per_seal() {
        let creds = sample();
        let a = seal(&creds, "4821").unwrap();
        let b = seal(&creds, "4821").unwrap();
        assert_ne!(a[3..HEADER_LEN], b[3..HEADER_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_pin_fails_closed() {
        let blob = seal(&sample(), "4821").unwrap();
        assert!(matches!(
            open(&blob, "4822"),
            Err(VaultError::WrongPinOrCorrupt)
        ));
    }

    #[test]
    fn test_empty_pin_rejected() {
        assert!(matches!(seal(&sample(), ""), Err(VaultError::EmptyPin)));
        assert!(matches!(open(&[0u8; 80], ""), Err(VaultError::EmptyPin)));
    }

    #[test]
    fn test_set_under_wrong_exchange_is_malformed() {
        let salt = [7u8; SALT_LEN];
        let iv = [9u8; IV_LEN];
        let keys = VaultKeys::derive("4821", &salt);
        let plaintext = br#"{"okx":{"exchange":"binance","api_key":"k","api_secret":"s"}}"#;
        let blob = seal_with_keys(plaintext, &keys, &salt, &iv).unwrap();

        assert!(matches!(open(&blob, "4821"), Err(VaultError::Malformed(_))));
    }

    #[test]
    fn test_truncated_blob_is_malformed() {
        let blob = seal(&sample(), "4821").unwrap();
        assert!(matches!(
            open(&blob[..HEADER_LEN + TAG_LEN - 1], "4821"),
            Err(VaultError::Malformed(_))
        ));
        assert!(matches!(open(&[], "4821"), Err(VaultError::Malformed(_))));
    }

    #[test]
    fn test_every_single_byte_flip_is_rejected() {
        let creds = sample();
        let blob = seal(&creds, "4821").unwrap();
        let keys = VaultKeys::derive("4821", &blob[3..3 + SALT_LEN]);

        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            assert!(
                matches!(
                    open_with_keys(&tampered, &keys),
                    Err(VaultError::WrongPinOrCorrupt)
                ),
                "flip at byte {i} was not rejected"
            );
        }
    }

    #[test]
    fn test_byte_flip_in_each_region_via_pin() {
        let blob = seal(&sample(), "4821").unwrap();
        let regions = [0, 3, 3 + SALT_LEN, HEADER_LEN, blob.len() - 1];
        for i in regions {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x80;
            assert!(
                matches!(open(&tampered, "4821"), Err(VaultError::WrongPinOrCorrupt)),
                "flip at byte {i} was not rejected"
            );
        }
    }

    #[test]
    fn test_verified_garbage_payload_is_malformed() {
        let keys = VaultKeys::derive("4821", &[7u8; SALT_LEN]);
        let blob = seal_with_keys(b"not json", &keys, &[7u8; SALT_LEN], &[9u8; IV_LEN]).unwrap();
        assert!(matches!(
            open_with_keys(&blob, &keys),
            Err(VaultError::Malformed(_))
        ));
    }
}
