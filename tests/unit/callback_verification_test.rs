//! Cross-provider callback verification through the public adapter surface
//!
//! Each provider's verifier must accept exactly the callbacks its own key
//! signed, and nothing else. Signatures here are recomputed with the shared
//! signing primitives, the same way the provider's server would.

use std::collections::HashMap;
use std::time::Duration;

use hapay::config::{MomoConfig, PayOsConfig, VnPayConfig, ZaloPayConfig};
use hapay::core::signing::{canonical_query, hmac_sha256_hex};
use hapay::modules::gateways::{
    CreatePaymentRequest, MomoGateway, PayOsGateway, PaymentGateway, VnPayGateway, ZaloPayGateway,
};

const TIMEOUT: Duration = Duration::from_secs(30);

fn momo_gateway(secret_key: &str) -> MomoGateway {
    MomoGateway::new(
        MomoConfig {
            partner_code: "HAPAY".to_string(),
            access_key: "access123".to_string(),
            secret_key: secret_key.to_string(),
            endpoint: "https://test-payment.momo.vn".to_string(),
            redirect_url: "https://shop.example/payment/momo-return".to_string(),
            ipn_url: "https://shop.example/payment/momo-ipn".to_string(),
            confirm_on_return: true,
        },
        TIMEOUT,
    )
    .unwrap()
}

fn zalopay_gateway() -> ZaloPayGateway {
    ZaloPayGateway::new(
        ZaloPayConfig {
            app_id: "2553".to_string(),
            key1: "request-key".to_string(),
            key2: "callback-key".to_string(),
            endpoint: "https://sb-openapi.zalopay.vn".to_string(),
            callback_url: "https://shop.example/payment/zalopay-ipn".to_string(),
            redirect_url: "https://shop.example/payment/zalopay-return".to_string(),
            confirm_on_return: false,
        },
        TIMEOUT,
    )
    .unwrap()
}

fn vnpay_gateway() -> VnPayGateway {
    VnPayGateway::new(
        VnPayConfig {
            tmn_code: "HAPAY01".to_string(),
            hash_secret: "vnpaysecret".to_string(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            api_url: "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".to_string(),
            return_url: "https://shop.example/payment/vnpay-return".to_string(),
            confirm_on_return: true,
        },
        TIMEOUT,
    )
    .unwrap()
}

fn payos_gateway() -> PayOsGateway {
    PayOsGateway::new(
        PayOsConfig {
            client_id: "client-1".to_string(),
            api_key: "api-key-1".to_string(),
            checksum_key: "checksum-key-1".to_string(),
            endpoint: "https://api-merchant.payos.vn".to_string(),
            return_url: "https://shop.example/payment/payos-return".to_string(),
            cancel_url: "https://shop.example/checkout".to_string(),
            confirm_on_return: false,
        },
        TIMEOUT,
    )
    .unwrap()
}

/// Sign a field map the way MoMo's server does: every signed field plus the
/// merchant's access key, alphabetical, raw values
fn momo_signature(secret_key: &str, fields: &HashMap<String, String>) -> String {
    let signed_names = [
        "amount",
        "extraData",
        "message",
        "orderId",
        "orderInfo",
        "orderType",
        "partnerCode",
        "payType",
        "requestId",
        "responseTime",
        "resultCode",
        "transId",
    ];
    let mut pairs: Vec<(&str, &str)> = signed_names
        .iter()
        .map(|name| (*name, fields.get(*name).map(String::as_str).unwrap_or("")))
        .collect();
    pairs.push(("accessKey", "access123"));
    hmac_sha256_hex(secret_key, &canonical_query(&pairs, None)).unwrap()
}

fn momo_callback() -> HashMap<String, String> {
    HashMap::from([
        ("partnerCode".to_string(), "HAPAY".to_string()),
        ("orderId".to_string(), "240612090000123456".to_string()),
        ("requestId".to_string(), "req-1".to_string()),
        ("amount".to_string(), "150000".to_string()),
        ("orderInfo".to_string(), "Thanh toan HA100001".to_string()),
        ("orderType".to_string(), "momo_wallet".to_string()),
        ("transId".to_string(), "4088878653".to_string()),
        ("resultCode".to_string(), "0".to_string()),
        ("message".to_string(), "Successful.".to_string()),
        ("payType".to_string(), "qr".to_string()),
        ("responseTime".to_string(), "1718160000000".to_string()),
        ("extraData".to_string(), "".to_string()),
    ])
}

#[test]
fn momo_accepts_only_its_own_secret() {
    let gateway = momo_gateway("secret456");

    let mut fields = momo_callback();
    fields.insert("signature".to_string(), momo_signature("secret456", &fields));
    assert!(gateway.verify_callback(&fields).unwrap());

    let mut forged = momo_callback();
    forged.insert("signature".to_string(), momo_signature("wrong-key", &forged));
    assert!(!gateway.verify_callback(&forged).unwrap());
}

#[test]
fn momo_unsigned_extra_field_does_not_break_verification() {
    // Providers add informational fields over time; only the documented
    // signed set participates in the signature.
    let gateway = momo_gateway("secret456");
    let mut fields = momo_callback();
    fields.insert("signature".to_string(), momo_signature("secret456", &fields));
    fields.insert("promotionInfo".to_string(), "[]".to_string());
    assert!(gateway.verify_callback(&fields).unwrap());
}

fn zalopay_callback(mac_key: &str) -> HashMap<String, String> {
    let mut fields = HashMap::from([
        ("app_id".to_string(), "2553".to_string()),
        ("app_trans_id".to_string(), "240612_000123456".to_string()),
        ("amount".to_string(), "150000".to_string()),
        ("status".to_string(), "1".to_string()),
        ("zp_trans_id".to_string(), "240612000000123".to_string()),
    ]);
    let pairs: Vec<(&str, &str)> = ["amount", "app_id", "app_trans_id", "status", "zp_trans_id"]
        .iter()
        .map(|name| (*name, fields.get(*name).map(String::as_str).unwrap_or("")))
        .collect();
    let mac = hmac_sha256_hex(mac_key, &canonical_query(&pairs, None))
        .unwrap()
        .to_uppercase();
    fields.insert("mac".to_string(), mac);
    fields
}

#[test]
fn zalopay_verifies_with_key2_and_rejects_key1() {
    let gateway = zalopay_gateway();
    assert!(gateway.verify_callback(&zalopay_callback("callback-key")).unwrap());
    assert!(!gateway.verify_callback(&zalopay_callback("request-key")).unwrap());
}

#[test]
fn zalopay_rejects_tampered_amount() {
    let gateway = zalopay_gateway();
    let mut fields = zalopay_callback("callback-key");
    fields.insert("amount".to_string(), "1".to_string());
    assert!(!gateway.verify_callback(&fields).unwrap());
}

/// Decode a form-encoded query string back into a field map
fn query_to_fields(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| {
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value).map(|v| v.into_owned()).unwrap_or(value);
            (key.to_string(), value)
        })
        .collect()
}

#[tokio::test]
async fn vnpay_pay_url_verifies_against_its_own_gateway() {
    // The signed redirect URL built at create time carries exactly the field
    // set the verifier recomputes; a user returning straight from that URL
    // must verify cleanly.
    let gateway = vnpay_gateway();
    let created = gateway
        .create_payment(&CreatePaymentRequest {
            order_code: "HA100001".to_string(),
            amount_vnd: 150000,
            description: "Thanh toan don hang HA100001".to_string(),
            client_ip: Some("203.0.113.7".to_string()),
        })
        .await
        .unwrap();

    let (_, query) = created.pay_url.split_once('?').unwrap();
    let fields = query_to_fields(query);
    assert!(gateway.verify_callback(&fields).unwrap());

    let outcome = gateway.parse_callback(&fields).unwrap();
    assert_eq!(outcome.provider_order_id, created.provider_order_id);
    assert_eq!(outcome.amount_vnd, Some(150000));
}

#[tokio::test]
async fn vnpay_tampered_pay_url_fails_verification() {
    let gateway = vnpay_gateway();
    let created = gateway
        .create_payment(&CreatePaymentRequest {
            order_code: "HA100001".to_string(),
            amount_vnd: 150000,
            description: "Thanh toan don hang HA100001".to_string(),
            client_ip: None,
        })
        .await
        .unwrap();

    let (_, query) = created.pay_url.split_once('?').unwrap();
    let mut fields = query_to_fields(query);
    fields.insert("vnp_Amount".to_string(), "100".to_string());
    assert!(!gateway.verify_callback(&fields).unwrap());
}

fn payos_callback() -> HashMap<String, String> {
    let mut fields = HashMap::from([
        ("orderCode".to_string(), "240612090000123456".to_string()),
        ("amount".to_string(), "150000".to_string()),
        ("code".to_string(), "00".to_string()),
        ("desc".to_string(), "success".to_string()),
        ("reference".to_string(), "FT24164000001".to_string()),
    ]);
    let mut pairs: Vec<(&str, &str)> =
        fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let signature = hmac_sha256_hex("checksum-key-1", &canonical_query(&pairs, None)).unwrap();
    fields.insert("signature".to_string(), signature);
    fields
}

#[test]
fn payos_signs_every_field_except_the_signature() {
    let gateway = payos_gateway();
    let fields = payos_callback();
    assert!(gateway.verify_callback(&fields).unwrap());

    // PayOS signs the whole data object, so even an appended field breaks
    // the signature, unlike MoMo's fixed field set.
    let mut extended = payos_callback();
    extended.insert("counterAccountName".to_string(), "NGUYEN VAN A".to_string());
    assert!(!gateway.verify_callback(&extended).unwrap());
}

#[test]
fn payos_missing_signature_fails_closed() {
    let gateway = payos_gateway();
    let mut fields = payos_callback();
    fields.remove("signature");
    assert!(!gateway.verify_callback(&fields).unwrap());
}
