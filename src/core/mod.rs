pub mod currency;
pub mod error;
pub mod signing;

pub use error::{AppError, GatewayError, Result};
