use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::gateway_trait::{
    fresh_provider_order_id, CallbackOutcome, CreatePaymentRequest, CreateResult, PaymentGateway,
    PaymentMethod, QueryResult,
};
use crate::config::VnPayConfig;
use crate::core::signing::{canonical_query, hmac_sha512_hex, signature_matches, SpaceEncoding};
use crate::core::{AppError, GatewayError, Result};

/// VNPay card gateway client
///
/// The only HMAC-SHA512 provider. Creation builds a signed redirect URL
/// locally — no outbound HTTP. The canonical string is the URL-encoded sorted
/// query with `+` for spaces; return delivery sometimes URL-decodes `+` into
/// a space, so verification retries with `%20` before declaring failure.
pub struct VnPayGateway {
    client: Client,
    config: VnPayConfig,
}

impl VnPayGateway {
    pub fn new(config: VnPayConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("vnpay http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn sign(&self, fields: &[(&str, &str)], encoding: SpaceEncoding) -> Result<String> {
        let data = canonical_query(fields, Some(encoding));
        hmac_sha512_hex(&self.config.hash_secret, &data)
    }
}

#[async_trait]
impl PaymentGateway for VnPayGateway {
    fn name(&self) -> &'static str {
        "vnpay"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::VnPay
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreateResult> {
        if request.amount_vnd < self.min_amount_vnd() {
            return Err(AppError::validation(format!(
                "amount {} below vnpay minimum {}",
                request.amount_vnd,
                self.min_amount_vnd()
            )));
        }

        let txn_ref = fresh_provider_order_id();
        let create_date = Utc::now().format("%Y%m%d%H%M%S").to_string();
        // VNPay expects the amount multiplied by 100
        let amount = (request.amount_vnd * 100).to_string();
        let client_ip = request.client_ip.as_deref().unwrap_or("127.0.0.1");

        let fields: Vec<(&str, &str)> = vec![
            ("vnp_Version", "2.1.0"),
            ("vnp_Command", "pay"),
            ("vnp_TmnCode", &self.config.tmn_code),
            ("vnp_Amount", &amount),
            ("vnp_CurrCode", "VND"),
            ("vnp_TxnRef", &txn_ref),
            ("vnp_OrderInfo", &request.description),
            ("vnp_OrderType", "other"),
            ("vnp_Locale", "vn"),
            ("vnp_ReturnUrl", &self.config.return_url),
            ("vnp_IpAddr", client_ip),
            ("vnp_CreateDate", &create_date),
        ];

        let query = canonical_query(&fields, Some(SpaceEncoding::Plus));
        let secure_hash = self.sign(&fields, SpaceEncoding::Plus)?;
        let pay_url = format!(
            "{}?{}&vnp_SecureHash={}",
            self.config.pay_url, query, secure_hash
        );

        Ok(CreateResult {
            pay_url,
            provider_request_id: txn_ref.clone(),
            provider_order_id: txn_ref,
            amount_vnd: request.amount_vnd,
        })
    }

    fn verify_callback(&self, fields: &HashMap<String, String>) -> Result<bool> {
        let received = match fields.get("vnp_SecureHash") {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Ok(false),
        };

        // Every vnp_ field except the hash itself participates in the signature
        let mut pairs: Vec<(&str, &str)> = fields
            .iter()
            .filter(|(key, _)| {
                key.starts_with("vnp_")
                    && key.as_str() != "vnp_SecureHash"
                    && key.as_str() != "vnp_SecureHashType"
            })
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let expected = self.sign(&pairs, SpaceEncoding::Plus)?;
        if signature_matches(&expected, received) {
            return Ok(true);
        }

        // Redirect delivery may have turned `+` into a literal space already
        let expected = self.sign(&pairs, SpaceEncoding::Percent)?;
        Ok(signature_matches(&expected, received))
    }

    fn parse_callback(&self, fields: &HashMap<String, String>) -> Result<CallbackOutcome> {
        let provider_order_id = fields
            .get("vnp_TxnRef")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                GatewayError::MalformedResponse("vnpay callback missing vnp_TxnRef".to_string())
            })?;

        let result_code = fields.get("vnp_ResponseCode").cloned().unwrap_or_default();
        Ok(CallbackOutcome {
            provider_order_id,
            amount_vnd: fields
                .get("vnp_Amount")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|v| v / 100),
            success: result_code == "00",
            message: fields
                .get("vnp_Message")
                .or_else(|| fields.get("vnp_OrderInfo"))
                .cloned()
                .unwrap_or_default(),
            result_code,
        })
    }

    async fn query_transaction(&self, provider_order_id: &str) -> Result<QueryResult> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let create_date = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let order_info = format!("Query transaction {}", provider_order_id);

        let fields: Vec<(&str, &str)> = vec![
            ("vnp_RequestId", &request_id),
            ("vnp_Version", "2.1.0"),
            ("vnp_Command", "querydr"),
            ("vnp_TmnCode", &self.config.tmn_code),
            ("vnp_TxnRef", provider_order_id),
            ("vnp_OrderInfo", &order_info),
            ("vnp_CreateDate", &create_date),
            ("vnp_IpAddr", "127.0.0.1"),
        ];
        let secure_hash = self.sign(&fields, SpaceEncoding::Plus)?;

        let body = json!({
            "vnp_RequestId": request_id,
            "vnp_Version": "2.1.0",
            "vnp_Command": "querydr",
            "vnp_TmnCode": self.config.tmn_code,
            "vnp_TxnRef": provider_order_id,
            "vnp_OrderInfo": order_info,
            "vnp_CreateDate": create_date,
            "vnp_IpAddr": "127.0.0.1",
            "vnp_SecureHash": secure_hash,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("vnpay query: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("vnpay query HTTP {}", status)).into());
        }

        let parsed: VnPayQueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("vnpay query: {}", e)))?;

        Ok(QueryResult {
            provider_order_id: provider_order_id.to_string(),
            result_code: parsed.response_code,
            message: parsed.message.unwrap_or_default(),
            amount_vnd: parsed.amount.and_then(|v| v.parse::<i64>().ok()).map(|v| v / 100),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VnPayQueryResponse {
    #[serde(rename = "vnp_ResponseCode")]
    response_code: String,
    #[serde(rename = "vnp_Message")]
    message: Option<String>,
    #[serde(rename = "vnp_Amount")]
    amount: Option<String>,
}
