use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

use crate::core::Result;
use crate::modules::gateways::services::gateway_trait::flatten_json_fields;
use crate::modules::payments::services::{
    CreateOrderPaymentRequest, IpnAck, PaymentService,
};

/// Create a payment link for an order
///
/// POST /payment/{provider}-create
pub async fn create_payment(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    body: web::Json<CreateOrderPaymentRequest>,
) -> Result<HttpResponse> {
    let provider = path.into_inner();
    info!(provider, order_code = %body.order_code, "create payment request");
    let response = service
        .create_payment(&provider, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Browser return leg; always answers with a 302 to the storefront
///
/// GET /payment/{provider}-return
pub async fn payment_return(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    let provider = path.into_inner();
    let location = service.handle_return(&provider, &query.into_inner()).await;
    HttpResponse::Found()
        .insert_header(("Location", location))
        .finish()
}

/// Server-to-server IPN, JSON body (momo, zalopay, payos)
///
/// POST /payment/{provider}-ipn
pub async fn payment_ipn(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let provider = path.into_inner();
    let fields = ipn_fields(&provider, &body);
    let ack = service.handle_ipn(&provider, &fields).await;
    ack_response(&provider, &ack)
}

/// Server-to-server IPN, query-string variant (vnpay)
///
/// GET /payment/{provider}-ipn
pub async fn payment_ipn_query(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    let provider = path.into_inner();
    let ack = service.handle_ipn(&provider, &query.into_inner()).await;
    ack_response(&provider, &ack)
}

/// Manual status query against the provider
///
/// GET /payment/{provider}-query/{id}
pub async fn query_transaction(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (provider, provider_order_id) = path.into_inner();
    let result = service
        .query_transaction(&provider, &provider_order_id)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Ledger audit trail for an order
///
/// GET /payment/ledger/{order_code}
pub async fn order_ledger(
    service: web::Data<Arc<PaymentService>>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let order_code = path.into_inner();
    let view = service.order_ledger(&order_code).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Liveness probe
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Build the verifier field map from an IPN body
///
/// PayOS wraps the signed fields in a `data` object and puts the signature
/// beside it; the other providers sign the top-level body.
fn ipn_fields(provider: &str, body: &serde_json::Value) -> HashMap<String, String> {
    if provider == "payos" {
        let mut fields = body
            .get("data")
            .map(flatten_json_fields)
            .unwrap_or_default();
        if let Some(signature) = body.get("signature").and_then(|v| v.as_str()) {
            fields.insert("signature".to_string(), signature.to_string());
        }
        fields
    } else {
        flatten_json_fields(body)
    }
}

/// Shape the acknowledgement the provider's IPN contract expects
///
/// Always HTTP 200; gateways treat non-200 as undelivered and retry.
fn ack_response(provider: &str, ack: &IpnAck) -> HttpResponse {
    let body = match provider {
        "momo" => json!({
            "resultCode": ack.code.parse::<i64>().unwrap_or(99),
            "message": ack.message,
        }),
        "zalopay" => json!({
            "return_code": if ack.accepted { 1 } else { -1 },
            "return_message": ack.message,
        }),
        "vnpay" => json!({
            "RspCode": if ack.accepted { "00".to_string() } else { ack.code.clone() },
            "Message": ack.message,
        }),
        "payos" => json!({
            "code": if ack.accepted { "00".to_string() } else { ack.code.clone() },
            "desc": ack.message,
        }),
        _ => json!({ "code": ack.code, "message": ack.message }),
    };
    HttpResponse::Ok().json(body)
}

/// Route table for the payment module
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/payment")
            .route("/{provider}-create", web::post().to(create_payment))
            .route("/{provider}-return", web::get().to(payment_return))
            .route("/{provider}-ipn", web::post().to(payment_ipn))
            .route("/{provider}-ipn", web::get().to(payment_ipn_query))
            .route(
                "/{provider}-query/{id}",
                web::get().to(query_transaction),
            )
            .route("/ledger/{order_code}", web::get().to(order_ledger)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payos_ipn_fields_unwrap_data() {
        let body = json!({
            "code": "00",
            "desc": "success",
            "signature": "abc123",
            "data": {
                "orderCode": 240612090000i64,
                "amount": 150000,
                "code": "00"
            }
        });
        let fields = ipn_fields("payos", &body);
        assert_eq!(fields["orderCode"], "240612090000");
        assert_eq!(fields["amount"], "150000");
        assert_eq!(fields["signature"], "abc123");
        assert!(!fields.contains_key("desc"));
    }

    #[test]
    fn test_momo_ipn_fields_flatten_top_level() {
        let body = json!({ "orderId": "2406120001", "resultCode": 0, "signature": "ff" });
        let fields = ipn_fields("momo", &body);
        assert_eq!(fields["orderId"], "2406120001");
        assert_eq!(fields["resultCode"], "0");
    }
}
