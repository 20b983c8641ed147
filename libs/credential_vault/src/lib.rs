//! PIN-encrypted storage for exchange API credentials.
//!
//! The whole credential mapping is sealed into one binary blob:
//! `MAGIC(3) ‖ salt(16) ‖ iv(16) ‖ ciphertext(N) ‖ mac(32)`.
//! Keys come from PBKDF2-HMAC-SHA256 over the PIN, the payload is
//! AES-256-CTR, and an HMAC-SHA256 tag is verified before anything is
//! decrypted.

pub mod blob;
pub mod error;
pub mod store;

pub use blob::{open, seal, KDF_ITERATIONS, MAGIC};
pub use error::VaultError;
pub use store::CredentialVault;
