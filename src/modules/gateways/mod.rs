pub mod services;

pub use services::{
    CallbackOutcome, CreatePaymentRequest, CreateResult, MomoGateway, PayOsGateway,
    PaymentGateway, PaymentMethod, QueryResult, VnPayGateway, ZaloPayGateway,
};
