//! Canonicalization and HMAC properties shared by every gateway adapter

use proptest::prelude::*;

use hapay::core::signing::{
    canonical_query, hmac_sha256_hex, hmac_sha512_hex, signature_matches, SpaceEncoding,
};

fn field_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,15}"
}

fn field_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._-]{0,24}"
}

proptest! {
    /// The canonical string must not depend on the order fields arrive in
    #[test]
    fn canonical_query_is_permutation_invariant(
        mut fields in proptest::collection::vec((field_name(), field_value()), 1..8)
    ) {
        fields.sort();
        fields.dedup_by(|a, b| a.0 == b.0);

        let pairs: Vec<(&str, &str)> =
            fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut reversed = pairs.clone();
        reversed.reverse();

        prop_assert_eq!(
            canonical_query(&pairs, None),
            canonical_query(&reversed, None)
        );
    }

    /// Keys appear in strictly ascending order in the canonical string
    #[test]
    fn canonical_query_emits_sorted_keys(
        mut fields in proptest::collection::vec((field_name(), field_value()), 1..8)
    ) {
        fields.sort();
        fields.dedup_by(|a, b| a.0 == b.0);

        let pairs: Vec<(&str, &str)> =
            fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let canonical = canonical_query(&pairs, None);

        let keys: Vec<&str> = canonical
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| part.split('=').next().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);
    }

    /// Signing the same canonical string twice yields the same digest, and
    /// the digest is lowercase hex of the expected width
    #[test]
    fn hmac_digests_are_deterministic_lowercase_hex(
        key in "[a-zA-Z0-9]{1,32}",
        data in ".{0,64}"
    ) {
        let d256 = hmac_sha256_hex(&key, &data).unwrap();
        prop_assert_eq!(&d256, &hmac_sha256_hex(&key, &data).unwrap());
        prop_assert_eq!(d256.len(), 64);
        prop_assert!(d256.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let d512 = hmac_sha512_hex(&key, &data).unwrap();
        prop_assert_eq!(d512.len(), 128);
    }

    /// A single flipped byte in the signed data changes the digest
    #[test]
    fn hmac_detects_any_tamper(
        key in "[a-zA-Z0-9]{1,32}",
        data in "[a-zA-Z0-9]{1,64}"
    ) {
        let mut tampered = data.clone().into_bytes();
        tampered[0] = if tampered[0] == b'x' { b'y' } else { b'x' };
        let tampered = String::from_utf8(tampered).unwrap();
        prop_assume!(tampered != data);

        prop_assert_ne!(
            hmac_sha256_hex(&key, &data).unwrap(),
            hmac_sha256_hex(&key, &tampered).unwrap()
        );
    }

    /// Hex case never affects signature comparison
    #[test]
    fn signature_comparison_ignores_case(digest in "[0-9a-f]{64}") {
        prop_assert!(signature_matches(&digest, &digest.to_uppercase()));
    }
}

#[test]
fn space_encoding_variants_differ_only_in_spaces() {
    let fields = [("vnp_OrderInfo", "Thanh toan don hang HA100001")];
    let plus = canonical_query(&fields, Some(SpaceEncoding::Plus));
    let percent = canonical_query(&fields, Some(SpaceEncoding::Percent));

    assert_eq!(plus, "vnp_OrderInfo=Thanh+toan+don+hang+HA100001");
    assert_eq!(percent, "vnp_OrderInfo=Thanh%20toan%20don%20hang%20HA100001");
    assert_eq!(plus.replace('+', "%20"), percent);
}

#[test]
fn space_free_values_are_encoding_independent() {
    let fields = [("amount", "150000"), ("orderId", "HA100001")];
    assert_eq!(
        canonical_query(&fields, Some(SpaceEncoding::Plus)),
        canonical_query(&fields, Some(SpaceEncoding::Percent))
    );
}

#[test]
fn empty_signature_never_matches() {
    assert!(!signature_matches("", ""));
    assert!(!signature_matches("", "abc"));
}
