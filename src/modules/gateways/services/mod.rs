pub mod gateway_trait;
pub mod momo;
pub mod payos;
pub mod vnpay;
pub mod zalopay;

pub use gateway_trait::{
    flatten_json_fields, fresh_provider_order_id, CallbackOutcome, CreatePaymentRequest,
    CreateResult, PaymentGateway, PaymentMethod, QueryResult,
};
pub use momo::MomoGateway;
pub use payos::PayOsGateway;
pub use vnpay::VnPayGateway;
pub use zalopay::ZaloPayGateway;
