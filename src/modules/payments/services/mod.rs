pub mod payment_service;

pub use payment_service::{
    CreateOrderPaymentRequest, CreateOrderPaymentResponse, IpnAck, OrderLedgerView,
    PaymentService, ProviderEntry,
};
