//! Keyed-hash signing primitives shared by the gateway adapters
//!
//! Every provider signs an HMAC over a canonical string built from its own
//! field set. The variants between providers are the hash algorithm
//! (SHA-256 vs SHA-512), the hex case they emit, and how spaces are encoded
//! in query-string canonical forms. Canonicalization lives here so the
//! create path and the verify path can never drift apart.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::core::error::{AppError, Result};

/// How spaces (and other reserved characters) appear in a canonical query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceEncoding {
    /// RFC 3986 percent-encoding: space becomes `%20`
    Percent,
    /// application/x-www-form-urlencoded: space becomes `+`
    Plus,
}

/// Build the canonical `key=value&key=value` string for signing
///
/// Pairs are sorted alphabetically by field name. `encoding = None` leaves
/// values raw (JSON-body providers); otherwise values are URL-encoded with
/// the requested space convention (query-string providers).
pub fn canonical_query(fields: &[(&str, &str)], encoding: Option<SpaceEncoding>) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    sorted
        .iter()
        .map(|(key, value)| match encoding {
            None => format!("{}={}", key, value),
            Some(mode) => {
                let encoded = urlencoding::encode(value).into_owned();
                let encoded = match mode {
                    SpaceEncoding::Percent => encoded,
                    SpaceEncoding::Plus => encoded.replace("%20", "+"),
                };
                format!("{}={}", key, encoded)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 over `data`, returned as lowercase hex
///
/// The only failure mode is an empty key, which is a configuration problem
/// surfaced at startup, never at request time.
pub fn hmac_sha256_hex(key: &str, data: &str) -> Result<String> {
    if key.is_empty() {
        return Err(AppError::configuration("empty HMAC signing key"));
    }
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::configuration(format!("invalid HMAC key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// HMAC-SHA512 over `data`, returned as lowercase hex
pub fn hmac_sha512_hex(key: &str, data: &str) -> Result<String> {
    if key.is_empty() {
        return Err(AppError::configuration("empty HMAC signing key"));
    }
    let mut mac = Hmac::<Sha512>::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::configuration(format!("invalid HMAC key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare two hex digests, ignoring case
///
/// Providers are inconsistent about the hex case of their own samples, so
/// verification never depends on it.
pub fn signature_matches(expected: &str, received: &str) -> bool {
    !expected.is_empty() && expected.eq_ignore_ascii_case(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_query_sorts_alphabetically() {
        let fields = [("orderId", "HA100001"), ("amount", "150000"), ("partnerCode", "HAPAY")];
        assert_eq!(
            canonical_query(&fields, None),
            "amount=150000&orderId=HA100001&partnerCode=HAPAY"
        );
    }

    #[test]
    fn test_canonical_query_percent_encoding() {
        let fields = [("vnp_OrderInfo", "Thanh toan don hang")];
        assert_eq!(
            canonical_query(&fields, Some(SpaceEncoding::Percent)),
            "vnp_OrderInfo=Thanh%20toan%20don%20hang"
        );
    }

    #[test]
    fn test_canonical_query_plus_encoding() {
        let fields = [("vnp_OrderInfo", "Thanh toan don hang")];
        assert_eq!(
            canonical_query(&fields, Some(SpaceEncoding::Plus)),
            "vnp_OrderInfo=Thanh+toan+don+hang"
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let digest = hmac_sha256_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_known_vector() {
        // RFC 4231 test case 2
        let digest = hmac_sha512_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_empty_key_is_configuration_error() {
        let err = hmac_sha256_hex("", "data").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_signature_matches_is_case_insensitive() {
        assert!(signature_matches("ABCDEF01", "abcdef01"));
        assert!(!signature_matches("abcdef01", "abcdef02"));
        assert!(!signature_matches("", ""));
    }
}
