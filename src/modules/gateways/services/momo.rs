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
use crate::config::MomoConfig;
use crate::core::signing::{canonical_query, hmac_sha256_hex, signature_matches};
use crate::core::{AppError, GatewayError, Result};

/// MoMo wallet gateway client
///
/// Signs HMAC-SHA256 over an alphabetical `key=value&...` canonical string,
/// lowercase hex, raw values (no URL encoding). The access key participates
/// in every canonical string but is never sent back by callbacks, so the
/// verifier injects it from config.
pub struct MomoGateway {
    client: Client,
    config: MomoConfig,
}

/// Callback fields MoMo signs, alphabetical; `accessKey` comes from config
const CALLBACK_SIGNED_FIELDS: [&str; 12] = [
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

impl MomoGateway {
    pub fn new(config: MomoConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("momo http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn sign(&self, fields: &[(&str, &str)]) -> Result<String> {
        let data = canonical_query(fields, None);
        hmac_sha256_hex(&self.config.secret_key, &data)
    }
}

#[async_trait]
impl PaymentGateway for MomoGateway {
    fn name(&self) -> &'static str {
        "momo"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::Momo
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreateResult> {
        if request.amount_vnd < self.min_amount_vnd() {
            return Err(AppError::validation(format!(
                "amount {} below momo minimum {}",
                request.amount_vnd,
                self.min_amount_vnd()
            )));
        }

        let order_id = fresh_provider_order_id();
        let request_id = uuid::Uuid::new_v4().to_string();
        let amount = request.amount_vnd.to_string();

        let signature = self.sign(&[
            ("accessKey", &self.config.access_key),
            ("amount", &amount),
            ("extraData", ""),
            ("ipnUrl", &self.config.ipn_url),
            ("orderId", &order_id),
            ("orderInfo", &request.description),
            ("partnerCode", &self.config.partner_code),
            ("redirectUrl", &self.config.redirect_url),
            ("requestId", &request_id),
            ("requestType", "captureWallet"),
        ])?;

        let body = json!({
            "partnerCode": self.config.partner_code,
            "accessKey": self.config.access_key,
            "requestId": request_id,
            "amount": request.amount_vnd,
            "orderId": order_id,
            "orderInfo": request.description,
            "redirectUrl": self.config.redirect_url,
            "ipnUrl": self.config.ipn_url,
            "extraData": "",
            "requestType": "captureWallet",
            "lang": "vi",
            "signature": signature,
        });

        let url = format!("{}/v2/gateway/api/create", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("momo create: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                GatewayError::Transport(format!("momo create HTTP {}: {}", status, body)).into(),
            );
        }

        let parsed: MomoCreateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("momo create: {}", e)))?;

        if parsed.result_code != 0 {
            return Err(GatewayError::Rejected {
                code: parsed.result_code.to_string(),
                message: parsed.message,
            }
            .into());
        }

        let pay_url = parsed.pay_url.ok_or_else(|| {
            GatewayError::MalformedResponse("momo create response missing payUrl".to_string())
        })?;

        Ok(CreateResult {
            pay_url,
            provider_order_id: order_id,
            provider_request_id: request_id,
            amount_vnd: request.amount_vnd,
        })
    }

    fn verify_callback(&self, fields: &HashMap<String, String>) -> Result<bool> {
        let received = match fields.get("signature") {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Ok(false),
        };

        let mut pairs: Vec<(&str, &str)> = CALLBACK_SIGNED_FIELDS
            .iter()
            .map(|name| (*name, fields.get(*name).map(String::as_str).unwrap_or("")))
            .collect();
        pairs.push(("accessKey", &self.config.access_key));

        let expected = self.sign(&pairs)?;
        Ok(signature_matches(&expected, received))
    }

    fn parse_callback(&self, fields: &HashMap<String, String>) -> Result<CallbackOutcome> {
        let provider_order_id = fields
            .get("orderId")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                GatewayError::MalformedResponse("momo callback missing orderId".to_string())
            })?;

        let result_code = fields.get("resultCode").cloned().unwrap_or_default();
        Ok(CallbackOutcome {
            provider_order_id,
            amount_vnd: fields.get("amount").and_then(|v| v.parse().ok()),
            success: result_code == "0",
            message: fields.get("message").cloned().unwrap_or_default(),
            result_code,
        })
    }

    async fn query_transaction(&self, provider_order_id: &str) -> Result<QueryResult> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let signature = self.sign(&[
            ("accessKey", &self.config.access_key),
            ("orderId", provider_order_id),
            ("partnerCode", &self.config.partner_code),
            ("requestId", &request_id),
        ])?;

        let body = json!({
            "partnerCode": self.config.partner_code,
            "accessKey": self.config.access_key,
            "requestId": request_id,
            "orderId": provider_order_id,
            "lang": "vi",
            "signature": signature,
        });

        let url = format!("{}/v2/gateway/api/query", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("momo query: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("momo query HTTP {}", status)).into());
        }

        let parsed: MomoQueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("momo query: {}", e)))?;

        Ok(QueryResult {
            provider_order_id: parsed.order_id.unwrap_or_else(|| provider_order_id.to_string()),
            result_code: parsed.result_code.to_string(),
            message: parsed.message,
            amount_vnd: parsed.amount,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MomoCreateResponse {
    #[serde(rename = "resultCode")]
    result_code: i64,
    #[serde(default)]
    message: String,
    #[serde(rename = "payUrl")]
    pay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MomoQueryResponse {
    #[serde(rename = "resultCode")]
    result_code: i64,
    #[serde(default)]
    message: String,
    #[serde(rename = "orderId")]
    order_id: Option<String>,
    amount: Option<i64>,
}
