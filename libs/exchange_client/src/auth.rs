//! Request signing for the exchanges' private wallet endpoints.
//!
//! Four schemes are in use:
//! - Binance: hex `HMAC-SHA256(secret, query_string)` appended as `signature`.
//! - OKX / KuCoin: base64 `HMAC-SHA256(secret, ts + METHOD + path + body)`.
//!   KuCoin additionally signs the passphrase itself.
//! - Gate: hex `HMAC-SHA512(secret, METHOD\npath\nquery\nhex(SHA512(body))\nts)`.
//! - Kraken: base64 `HMAC-SHA512(b64decode(secret), path + SHA256(nonce + body))`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use common::Error;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC-SHA256 key rejected: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn hmac_sha512(key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC-SHA512 key rejected: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Binance: hex signature over the full query string.
pub fn sign_binance(secret: &str, query: &str) -> Result<String, Error> {
    Ok(hex::encode(hmac_sha256(secret.as_bytes(), query.as_bytes())?))
}

/// OKX and KuCoin request signature.
///
/// `path` must include the query string exactly as sent.
pub fn sign_prehash_b64(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, Error> {
    let prehash = format!("{}{}{}{}", timestamp, method.to_ascii_uppercase(), path, body);
    Ok(BASE64.encode(hmac_sha256(secret.as_bytes(), prehash.as_bytes())?))
}

/// KuCoin key-version 2 passphrase: base64 `HMAC-SHA256(secret, passphrase)`.
pub fn sign_kucoin_passphrase(secret: &str, passphrase: &str) -> Result<String, Error> {
    Ok(BASE64.encode(hmac_sha256(secret.as_bytes(), passphrase.as_bytes())?))
}

/// Gate v4 signature. `query` is the raw query string without `?`.
pub fn sign_gate(
    secret: &str,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
    timestamp: &str,
) -> Result<String, Error> {
    let body_hash = hex::encode(Sha512::digest(body.as_bytes()));
    let payload = format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path,
        query,
        body_hash,
        timestamp
    );
    Ok(hex::encode(hmac_sha512(secret.as_bytes(), payload.as_bytes())?))
}

/// Kraken `API-Sign`. `secret` is the base64 private key as issued.
pub fn sign_kraken(secret: &str, path: &str, nonce: u64, body: &str) -> Result<String, Error> {
    let key = BASE64
        .decode(secret.trim())
        .map_err(|e| Error::Auth(format!("Kraken secret is not valid base64: {e}")))?;

    let mut sha = Sha256::new();
    sha.update(nonce.to_string().as_bytes());
    sha.update(body.as_bytes());
    let inner = sha.finalize();

    let mut message = Vec::with_capacity(path.len() + inner.len());
    message.extend_from_slice(path.as_bytes());
    message.extend_from_slice(&inner);

    Ok(BASE64.encode(hmac_sha512(&key, &message)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    const RFC_KEY: &[u8] = b"Jefe";
    const RFC_DATA: &[u8] = b"what do ya want for nothing?";

    #[test]
    fn test_hmac_sha256_rfc4231() {
        assert_eq!(
            hex::encode(hmac_sha256(RFC_KEY, RFC_DATA).unwrap()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_rfc4231() {
        assert_eq!(
            hex::encode(hmac_sha512(RFC_KEY, RFC_DATA).unwrap()),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_binance_documented_example() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_binance(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_kraken_documented_example() {
        let secret = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
        let body = "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25";
        assert_eq!(
            sign_kraken(secret, "/0/private/AddOrder", 1616492376594, body).unwrap(),
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn test_kraken_rejects_non_base64_secret() {
        assert!(matches!(
            sign_kraken("not base64!!", "/0/private/Balance", 1, "nonce=1"),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn test_okx_reference_signature() {
        let sig = sign_prehash_b64(
            "okx-secret",
            "2024-01-01T00:00:00.000Z",
            "get",
            "/api/v5/asset/currencies?ccy=BTC",
            "",
        )
        .unwrap();
        assert_eq!(sig, "AxSZIN8ijTB9eM0Y0vHifXDLuXYjkBncWXSzliH0l9k=");
    }

    #[test]
    fn test_kucoin_reference_signatures() {
        let sig = sign_prehash_b64("kucoin-secret", "1700000000000", "GET", "/api/v3/currencies/USDT", "").unwrap();
        assert_eq!(sig, "e9q1bXdDtz3sYvdpFw59kyG/nqlp7UCw13mZiNqRatI=");
        assert_eq!(
            sign_kucoin_passphrase("kucoin-secret", "my-passphrase").unwrap(),
            "E+5H541A6pgyW6CKOY0LKsPqrOuaRy6pGVqwds2eoes="
        );
    }

    #[test]
    fn test_gate_reference_signature() {
        let sig = sign_gate(
            "gate-secret",
            "get",
            "/api/v4/wallet/withdraw_status",
            "currency=BTC",
            "",
            "1700000000",
        )
        .unwrap();
        assert_eq!(
            sig,
            "4e12b12ad1cce3fa5f824cce8938462204319e135a1716bcdeeb58e4146b867bdd8f88506d17650c8f33331d04db8d0ac19700b2f4dfe636c05a3b950e413a19"
        );
    }
}
