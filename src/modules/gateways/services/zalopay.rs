use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;

use super::gateway_trait::{
    CallbackOutcome, CreatePaymentRequest, CreateResult, PaymentGateway, PaymentMethod,
    QueryResult,
};
use crate::config::ZaloPayConfig;
use crate::core::signing::{canonical_query, hmac_sha256_hex, signature_matches};
use crate::core::{AppError, GatewayError, Result};

/// ZaloPay QR/wallet gateway client
///
/// Two signing keys: `key1` signs outbound requests, `key2` verifies inbound
/// callbacks. HMAC-SHA256 over the alphabetical canonical string; ZaloPay's
/// own samples emit uppercase hex, so we emit uppercase and verify
/// case-insensitively.
pub struct ZaloPayGateway {
    client: Client,
    config: ZaloPayConfig,
}

/// Callback fields signed with key2; signature travels in `mac`
const CALLBACK_SIGNED_FIELDS: [&str; 5] =
    ["amount", "app_id", "app_trans_id", "status", "zp_trans_id"];

impl ZaloPayGateway {
    pub fn new(config: ZaloPayConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("zalopay http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn sign_request(&self, fields: &[(&str, &str)]) -> Result<String> {
        let data = canonical_query(fields, None);
        hmac_sha256_hex(&self.config.key1, &data).map(|s| s.to_uppercase())
    }

    fn sign_callback(&self, fields: &[(&str, &str)]) -> Result<String> {
        let data = canonical_query(fields, None);
        hmac_sha256_hex(&self.config.key2, &data).map(|s| s.to_uppercase())
    }

    /// ZaloPay requires the provider order id prefixed with the creation date
    fn fresh_app_trans_id() -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        format!("{}_{:09}", Utc::now().format("%y%m%d"), suffix)
    }
}

#[async_trait]
impl PaymentGateway for ZaloPayGateway {
    fn name(&self) -> &'static str {
        "zalopay"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::ZaloPay
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreateResult> {
        if request.amount_vnd < self.min_amount_vnd() {
            return Err(AppError::validation(format!(
                "amount {} below zalopay minimum {}",
                request.amount_vnd,
                self.min_amount_vnd()
            )));
        }

        let app_trans_id = Self::fresh_app_trans_id();
        let app_time = Utc::now().timestamp_millis().to_string();
        let amount = request.amount_vnd.to_string();
        let embed_data = serde_json::json!({
            "redirecturl": self.config.redirect_url,
            "merchantinfo": request.order_code,
        })
        .to_string();
        let item = "[]";

        let mac = self.sign_request(&[
            ("amount", &amount),
            ("app_id", &self.config.app_id),
            ("app_time", &app_time),
            ("app_trans_id", &app_trans_id),
            ("app_user", &request.order_code),
            ("embed_data", &embed_data),
            ("item", item),
        ])?;

        let form = [
            ("app_id", self.config.app_id.as_str()),
            ("app_user", request.order_code.as_str()),
            ("app_time", app_time.as_str()),
            ("amount", amount.as_str()),
            ("app_trans_id", app_trans_id.as_str()),
            ("embed_data", embed_data.as_str()),
            ("item", item),
            ("description", request.description.as_str()),
            ("bank_code", "zalopayapp"),
            ("callback_url", self.config.callback_url.as_str()),
            ("mac", mac.as_str()),
        ];

        let url = format!("{}/v2/create", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("zalopay create: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "zalopay create HTTP {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: ZaloPayCreateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("zalopay create: {}", e)))?;

        if parsed.return_code != 1 {
            return Err(GatewayError::Rejected {
                code: parsed
                    .sub_return_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| parsed.return_code.to_string()),
                message: parsed.return_message,
            }
            .into());
        }

        let pay_url = parsed.order_url.ok_or_else(|| {
            GatewayError::MalformedResponse("zalopay create response missing order_url".to_string())
        })?;

        Ok(CreateResult {
            pay_url,
            provider_request_id: parsed.zp_trans_token.unwrap_or_else(|| app_trans_id.clone()),
            provider_order_id: app_trans_id,
            amount_vnd: request.amount_vnd,
        })
    }

    fn verify_callback(&self, fields: &HashMap<String, String>) -> Result<bool> {
        let received = match fields.get("mac") {
            Some(mac) if !mac.is_empty() => mac,
            _ => return Ok(false),
        };

        let pairs: Vec<(&str, &str)> = CALLBACK_SIGNED_FIELDS
            .iter()
            .map(|name| (*name, fields.get(*name).map(String::as_str).unwrap_or("")))
            .collect();

        let expected = self.sign_callback(&pairs)?;
        Ok(signature_matches(&expected, received))
    }

    fn parse_callback(&self, fields: &HashMap<String, String>) -> Result<CallbackOutcome> {
        let provider_order_id = fields
            .get("app_trans_id")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                GatewayError::MalformedResponse(
                    "zalopay callback missing app_trans_id".to_string(),
                )
            })?;

        let result_code = fields.get("status").cloned().unwrap_or_default();
        Ok(CallbackOutcome {
            provider_order_id,
            amount_vnd: fields.get("amount").and_then(|v| v.parse().ok()),
            success: result_code == "1",
            message: fields.get("message").cloned().unwrap_or_default(),
            result_code,
        })
    }

    async fn query_transaction(&self, provider_order_id: &str) -> Result<QueryResult> {
        let mac = self.sign_request(&[
            ("app_id", &self.config.app_id),
            ("app_trans_id", provider_order_id),
        ])?;

        let form = [
            ("app_id", self.config.app_id.as_str()),
            ("app_trans_id", provider_order_id),
            ("mac", mac.as_str()),
        ];

        let url = format!("{}/v2/query", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("zalopay query: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("zalopay query HTTP {}", status)).into());
        }

        let parsed: ZaloPayQueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("zalopay query: {}", e)))?;

        Ok(QueryResult {
            provider_order_id: provider_order_id.to_string(),
            result_code: parsed.return_code.to_string(),
            message: parsed.return_message,
            amount_vnd: parsed.amount,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZaloPayCreateResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    sub_return_code: Option<i64>,
    order_url: Option<String>,
    zp_trans_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZaloPayQueryResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    amount: Option<i64>,
}
