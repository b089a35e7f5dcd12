pub mod controllers;
pub mod services;

pub use services::{PaymentService, ProviderEntry};
