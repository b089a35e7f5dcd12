use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sqlx::MySqlPool;
use tracing::info;

use crate::config::TelegramConfig;
use crate::core::currency::format_vnd;
use crate::core::{AppError, Result};
use crate::modules::orders::models::Order;

/// A downstream "order paid" notification channel
#[async_trait]
pub trait PaidNotifier: Send + Sync {
    async fn notify_paid(&self, order: &Order, provider: &str, amount_vnd: i64) -> Result<()>;
}

/// Admin alert via the Telegram Bot API
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("telegram http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaidNotifier for TelegramNotifier {
    async fn notify_paid(&self, order: &Order, provider: &str, amount_vnd: i64) -> Result<()> {
        let text = format!(
            "✅ Order {} paid: {} via {}",
            order.order_code,
            format_vnd(amount_vnd),
            provider
        );
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(AppError::HttpClient)?;

        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "telegram sendMessage HTTP {}",
                response.status()
            )));
        }

        info!(order_code = %order.order_code, "admin telegram alert sent");
        Ok(())
    }
}

/// In-app notification row for the customer
pub struct InAppNotifier {
    pool: MySqlPool,
}

impl InAppNotifier {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaidNotifier for InAppNotifier {
    async fn notify_paid(&self, order: &Order, provider: &str, amount_vnd: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_notifications (order_id, title, body)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(order.id)
        .bind(format!("Order {} paid", order.order_code))
        .bind(format!(
            "We received your payment of {} via {}.",
            format_vnd(amount_vnd),
            provider
        ))
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        info!(order_code = %order.order_code, "in-app paid notification created");
        Ok(())
    }
}
