use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
///
/// Loaded once at startup and never mutated afterwards; every adapter owns an
/// immutable clone of its own section. Missing provider credentials are fatal
/// here, not at request time.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub frontend: FrontendConfig,
    pub momo: MomoConfig,
    pub zalopay: ZaloPayConfig,
    pub vnpay: VnPayConfig,
    pub payos: PayOsConfig,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// Bounded timeout for outbound gateway calls, in seconds
    pub gateway_timeout_secs: u64,
}

/// Storefront pages the return-redirect path sends the browser to
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// "Thank you" page, receives `?code={order_code}` on success
    pub thank_you_url: String,
    /// Checkout confirmation page, receives `?payfail=1&prov=..&rc=..`
    pub checkout_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
    pub redirect_url: String,
    pub ipn_url: String,
    /// Allow the return redirect to confirm on result code alone
    pub confirm_on_return: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZaloPayConfig {
    pub app_id: String,
    /// Request-signing key
    pub key1: String,
    /// Callback-verification key
    pub key2: String,
    pub endpoint: String,
    pub callback_url: String,
    pub redirect_url: String,
    pub confirm_on_return: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VnPayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    /// Hosted payment page the signed pay URL points at
    pub pay_url: String,
    /// Merchant API endpoint for status queries
    pub api_url: String,
    pub return_url: String,
    pub confirm_on_return: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayOsConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    pub endpoint: String,
    pub return_url: String,
    pub cancel_url: String,
    pub confirm_on_return: bool,
}

/// Optional admin alert channel; absent config disables the Telegram notifier
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::Configuration(format!("{} not set", key)))
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let telegram = match (env::var("TELEGRAM_BOT_TOKEN"), env::var("TELEGRAM_CHAT_ID")) {
            (Ok(bot_token), Ok(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid GATEWAY_TIMEOUT_SECS".to_string())
                    })?,
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            frontend: FrontendConfig {
                thank_you_url: required("FRONTEND_THANK_YOU_URL")?,
                checkout_url: required("FRONTEND_CHECKOUT_URL")?,
            },
            momo: MomoConfig {
                partner_code: required("MOMO_PARTNER_CODE")?,
                access_key: required("MOMO_ACCESS_KEY")?,
                secret_key: required("MOMO_SECRET_KEY")?,
                endpoint: env::var("MOMO_ENDPOINT")
                    .unwrap_or_else(|_| "https://test-payment.momo.vn".to_string()),
                redirect_url: required("MOMO_REDIRECT_URL")?,
                ipn_url: required("MOMO_IPN_URL")?,
                confirm_on_return: flag("MOMO_CONFIRM_ON_RETURN", true),
            },
            zalopay: ZaloPayConfig {
                app_id: required("ZALOPAY_APP_ID")?,
                key1: required("ZALOPAY_KEY1")?,
                key2: required("ZALOPAY_KEY2")?,
                endpoint: env::var("ZALOPAY_ENDPOINT")
                    .unwrap_or_else(|_| "https://sb-openapi.zalopay.vn".to_string()),
                callback_url: required("ZALOPAY_CALLBACK_URL")?,
                redirect_url: required("ZALOPAY_REDIRECT_URL")?,
                confirm_on_return: flag("ZALOPAY_CONFIRM_ON_RETURN", false),
            },
            vnpay: VnPayConfig {
                tmn_code: required("VNPAY_TMN_CODE")?,
                hash_secret: required("VNPAY_HASH_SECRET")?,
                pay_url: env::var("VNPAY_PAY_URL").unwrap_or_else(|_| {
                    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
                }),
                api_url: env::var("VNPAY_API_URL").unwrap_or_else(|_| {
                    "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".to_string()
                }),
                return_url: required("VNPAY_RETURN_URL")?,
                confirm_on_return: flag("VNPAY_CONFIRM_ON_RETURN", true),
            },
            payos: PayOsConfig {
                client_id: required("PAYOS_CLIENT_ID")?,
                api_key: required("PAYOS_API_KEY")?,
                checksum_key: required("PAYOS_CHECKSUM_KEY")?,
                endpoint: env::var("PAYOS_ENDPOINT")
                    .unwrap_or_else(|_| "https://api-merchant.payos.vn".to_string()),
                return_url: required("PAYOS_RETURN_URL")?,
                cancel_url: required("PAYOS_CANCEL_URL")?,
                confirm_on_return: flag("PAYOS_CONFIRM_ON_RETURN", false),
            },
            telegram,
        };

        Ok(config)
    }

    /// Validate configuration invariants beyond mere presence
    pub fn validate(&self) -> Result<()> {
        if self.app.gateway_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Gateway timeout must be greater than 0".to_string(),
            ));
        }

        // Empty signing keys would make every signature check fail open-ended;
        // refuse to start instead.
        for (name, key) in [
            ("MOMO_SECRET_KEY", &self.momo.secret_key),
            ("ZALOPAY_KEY1", &self.zalopay.key1),
            ("ZALOPAY_KEY2", &self.zalopay.key2),
            ("VNPAY_HASH_SECRET", &self.vnpay.hash_secret),
            ("PAYOS_CHECKSUM_KEY", &self.payos.checksum_key),
        ] {
            if key.trim().is_empty() {
                return Err(AppError::Configuration(format!("{} is empty", name)));
            }
        }

        Ok(())
    }
}
