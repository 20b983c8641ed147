//! Shared HTTP plumbing for the exchange adapters.
//!
//! Status handling, error-chain formatting and body summarising live here
//! so every adapter reports transport and decoding failures the same way.

use std::error::Error as StdError;
use std::time::Duration;

use common::{Error, ExchangeId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

const USER_AGENT: &str = "arb-scanner/0.1";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Base URL for an exchange, overridable via `env_var` (proxies, mirrors).
pub fn resolve_base_url(env_var: &str, default: &str) -> String {
    if let Ok(override_url) = std::env::var(env_var) {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using {} override: {}", env_var, normalized);
            return normalized;
        }
        warn!("Ignoring empty {} override", env_var);
    }
    default.to_string()
}

pub fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

pub fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let cut: String = compact.chars().take(MAX_CHARS).collect();
        format!("{}…", cut)
    } else {
        compact
    }
}

/// Parse an exchange number that may arrive as a string, blank or missing.
pub fn parse_num(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// A numeric field that exchanges send as a JSON string, a number, or not
/// at all. Use with `#[serde(default)]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Num(pub Option<f64>);

impl Num {
    pub fn get(self) -> Option<f64> {
        self.0
    }

    pub fn or_zero(self) -> f64 {
        self.0.unwrap_or(0.0)
    }

    /// Present and strictly positive.
    pub fn positive(self) -> Option<f64> {
        self.0.filter(|v| *v > 0.0)
    }
}

impl<'de> Deserialize<'de> for Num {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let parsed = match &value {
            serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            serde_json::Value::String(s) => parse_num(Some(s)),
            _ => None,
        };
        Ok(Num(parsed))
    }
}

/// Add a header, rejecting values that are not valid header text. `name`
/// must be lower-case.
pub fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), Error> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::Auth(format!("invalid value for header {}", name)))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Thin reqwest wrapper bound to one exchange for error attribution.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    exchange: ExchangeId,
}

impl HttpClient {
    pub fn new(exchange: ExchangeId, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self { client, exchange })
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Send a request and decode a 2xx JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, Error> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Http(format!("{} {}: {}", self.exchange, what, format_reqwest_error(&e))))?;

        let status_code = resp.status().as_u16();
        if status_code == 429 {
            warn!("{}: rate limited on {}", self.exchange, what);
            return Err(Error::RateLimited {
                retry_after_ms: 1000,
            });
        }

        let raw_body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        if !(200..300).contains(&status_code) {
            return Err(Error::ExchangeApi {
                exchange: self.exchange,
                status: status_code,
                message: summarize_response_body(&raw_body),
            });
        }

        serde_json::from_str(&raw_body).map_err(|e| {
            Error::Malformed(format!(
                "{} {}: {}; body={}",
                self.exchange,
                what,
                e,
                summarize_response_body(&raw_body)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_num() {
        assert_eq!(parse_num(Some("1.25")), Some(1.25));
        assert_eq!(parse_num(Some(" 3 ")), Some(3.0));
        assert_eq!(parse_num(Some("")), None);
        assert_eq!(parse_num(Some("n/a")), None);
        assert_eq!(parse_num(Some("NaN")), None);
        assert_eq!(parse_num(None), None);
    }

    #[test]
    fn test_num_accepts_strings_numbers_and_null() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            a: Num,
            #[serde(default)]
            b: Num,
            #[serde(default)]
            c: Num,
            #[serde(default)]
            d: Num,
        }
        let row: Row = serde_json::from_str(r#"{"a":"0.5","b":2,"c":null}"#).unwrap();
        assert_eq!(row.a.get(), Some(0.5));
        assert_eq!(row.b.get(), Some(2.0));
        assert_eq!(row.c.get(), None);
        assert_eq!(row.d.or_zero(), 0.0);
        assert_eq!(Num(Some(0.0)).positive(), None);
    }

    #[test]
    fn test_summarize_truncates_on_char_boundary() {
        let long = "é".repeat(900);
        let summary = summarize_response_body(&long);
        assert!(summary.ends_with('…'));
        assert_eq!(summary.chars().count(), 801);
        assert_eq!(summarize_response_body("a\nb"), "a b");
    }

    #[test]
    fn test_insert_header_rejects_newlines() {
        let mut headers = HeaderMap::new();
        assert!(insert_header(&mut headers, "x-api-key", "abc").is_ok());
        assert!(insert_header(&mut headers, "x-api-key", "a\nb").is_err());
        assert_eq!(headers.get("x-api-key").unwrap(), "abc");
    }
}
