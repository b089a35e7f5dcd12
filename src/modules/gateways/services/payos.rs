use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::gateway_trait::{
    fresh_provider_order_id, CallbackOutcome, CreatePaymentRequest, CreateResult, PaymentGateway,
    PaymentMethod, QueryResult,
};
use crate::config::PayOsConfig;
use crate::core::signing::{canonical_query, hmac_sha256_hex, signature_matches};
use crate::core::{AppError, GatewayError, Result};

/// PayOS bank-transfer aggregator client
///
/// Credentials travel in `x-client-id` / `x-api-key` headers; the checksum
/// key signs HMAC-SHA256 over the alphabetical `key=value&...` string. The
/// provider order code is numeric, so the fresh id is parsed into an i64.
/// Webhook verification signs the flattened `data` object, everything except
/// the `signature` field itself.
pub struct PayOsGateway {
    client: Client,
    config: PayOsConfig,
}

impl PayOsGateway {
    pub fn new(config: PayOsConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("payos http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn sign(&self, fields: &[(&str, &str)]) -> Result<String> {
        let data = canonical_query(fields, None);
        hmac_sha256_hex(&self.config.checksum_key, &data)
    }
}

#[async_trait]
impl PaymentGateway for PayOsGateway {
    fn name(&self) -> &'static str {
        "payos"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayOs
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreateResult> {
        if request.amount_vnd < self.min_amount_vnd() {
            return Err(AppError::validation(format!(
                "amount {} below payos minimum {}",
                request.amount_vnd,
                self.min_amount_vnd()
            )));
        }

        // PayOS order codes are numeric; the timestamp-based id fits an i64
        let order_code_num: i64 = fresh_provider_order_id().parse().map_err(|_| {
            AppError::internal("generated provider order id is not numeric".to_string())
        })?;
        let order_code = order_code_num.to_string();
        let amount = request.amount_vnd.to_string();

        let signature = self.sign(&[
            ("amount", &amount),
            ("cancelUrl", &self.config.cancel_url),
            ("description", &request.description),
            ("orderCode", &order_code),
            ("returnUrl", &self.config.return_url),
        ])?;

        let body = json!({
            "orderCode": order_code_num,
            "amount": request.amount_vnd,
            "description": request.description,
            "returnUrl": self.config.return_url,
            "cancelUrl": self.config.cancel_url,
            "signature": signature,
        });

        let url = format!("{}/v2/payment-requests", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("payos create: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "payos create HTTP {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: PayOsCreateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("payos create: {}", e)))?;

        if parsed.code != "00" {
            return Err(GatewayError::Rejected {
                code: parsed.code,
                message: parsed.desc,
            }
            .into());
        }

        let data = parsed.data.ok_or_else(|| {
            GatewayError::MalformedResponse("payos create response missing data".to_string())
        })?;

        Ok(CreateResult {
            pay_url: data.checkout_url,
            provider_order_id: order_code,
            provider_request_id: data.payment_link_id,
            amount_vnd: request.amount_vnd,
        })
    }

    fn verify_callback(&self, fields: &HashMap<String, String>) -> Result<bool> {
        let received = match fields.get("signature") {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Ok(false),
        };

        let mut pairs: Vec<(&str, &str)> = fields
            .iter()
            .filter(|(key, _)| key.as_str() != "signature")
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let expected = self.sign(&pairs)?;
        Ok(signature_matches(&expected, received))
    }

    fn parse_callback(&self, fields: &HashMap<String, String>) -> Result<CallbackOutcome> {
        let provider_order_id = fields
            .get("orderCode")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                GatewayError::MalformedResponse("payos callback missing orderCode".to_string())
            })?;

        let result_code = fields.get("code").cloned().unwrap_or_default();
        Ok(CallbackOutcome {
            provider_order_id,
            amount_vnd: fields.get("amount").and_then(|v| v.parse().ok()),
            success: result_code == "00",
            message: fields.get("desc").cloned().unwrap_or_default(),
            result_code,
        })
    }

    async fn query_transaction(&self, provider_order_id: &str) -> Result<QueryResult> {
        let url = format!(
            "{}/v2/payment-requests/{}",
            self.config.endpoint, provider_order_id
        );
        let response = self
            .client
            .get(&url)
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("payos query: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("payos query HTTP {}", status)).into());
        }

        let parsed: PayOsQueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("payos query: {}", e)))?;

        let (message, amount_vnd) = match parsed.data {
            Some(data) => (data.status, Some(data.amount)),
            None => (parsed.desc, None),
        };

        Ok(QueryResult {
            provider_order_id: provider_order_id.to_string(),
            result_code: parsed.code,
            message,
            amount_vnd,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PayOsCreateResponse {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<PayOsCreateData>,
}

#[derive(Debug, Deserialize)]
struct PayOsCreateData {
    #[serde(rename = "checkoutUrl")]
    checkout_url: String,
    #[serde(rename = "paymentLinkId")]
    payment_link_id: String,
}

#[derive(Debug, Deserialize)]
struct PayOsQueryResponse {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<PayOsQueryData>,
}

#[derive(Debug, Deserialize)]
struct PayOsQueryData {
    status: String,
    amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> PayOsGateway {
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
            Duration::from_secs(30),
        )
        .unwrap()
    }

    fn sample_callback(gateway: &PayOsGateway) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("orderCode".to_string(), "240612090000123456".to_string());
        fields.insert("amount".to_string(), "150000".to_string());
        fields.insert("code".to_string(), "00".to_string());
        fields.insert("desc".to_string(), "success".to_string());
        fields.insert("reference".to_string(), "FT24164000001".to_string());
        fields.insert("transactionDateTime".to_string(), "2024-06-12 09:00:00".to_string());

        let mut pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let signature = gateway.sign(&pairs).unwrap();
        fields.insert("signature".to_string(), signature);
        fields
    }

    #[test]
    fn test_callback_signature_round_trip() {
        let gateway = test_gateway();
        let fields = sample_callback(&gateway);
        assert!(gateway.verify_callback(&fields).unwrap());
    }

    #[test]
    fn test_callback_tampered_reference_fails() {
        let gateway = test_gateway();
        let mut fields = sample_callback(&gateway);
        fields.insert("reference".to_string(), "FT24164000002".to_string());
        assert!(!gateway.verify_callback(&fields).unwrap());
    }

    #[test]
    fn test_callback_empty_signature_fails() {
        let gateway = test_gateway();
        let mut fields = sample_callback(&gateway);
        fields.insert("signature".to_string(), String::new());
        assert!(!gateway.verify_callback(&fields).unwrap());
    }

    #[test]
    fn test_parse_callback() {
        let gateway = test_gateway();
        let fields = sample_callback(&gateway);
        let outcome = gateway.parse_callback(&fields).unwrap();
        assert_eq!(outcome.provider_order_id, "240612090000123456");
        assert_eq!(outcome.amount_vnd, Some(150000));
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_create_rejects_amount_below_minimum() {
        let gateway = test_gateway();
        let result = gateway
            .create_payment(&CreatePaymentRequest {
                order_code: "HA100001".to_string(),
                amount_vnd: 999,
                description: "test".to_string(),
                client_ip: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
