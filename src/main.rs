use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hapay::config::Config;
use hapay::middleware::RequestId;
use hapay::modules::gateways::services::{
    MomoGateway, PayOsGateway, PaymentGateway, VnPayGateway, ZaloPayGateway,
};
use hapay::modules::ledger::LedgerRepository;
use hapay::modules::notify::{
    InAppNotifier, NotificationService, NotifyOnceGuard, PaidNotifier, TelegramNotifier,
};
use hapay::modules::orders::{OrderRepository, PaymentStateMachine};
use hapay::modules::payments::controllers::payment_controller;
use hapay::modules::payments::{PaymentService, ProviderEntry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hapay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting HaPay payment core");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    // Create database connection pool
    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    let timeout = Duration::from_secs(config.app.gateway_timeout_secs);

    let orders = OrderRepository::new(db_pool.clone());
    let ledger = LedgerRepository::new(db_pool.clone());
    let state = PaymentStateMachine::new(orders.clone(), ledger.clone());

    let telegram: Option<Arc<dyn PaidNotifier>> = config.telegram.clone().map(|tg| {
        Arc::new(
            TelegramNotifier::new(tg, timeout).expect("Failed to build Telegram HTTP client"),
        ) as Arc<dyn PaidNotifier>
    });
    if telegram.is_none() {
        tracing::info!("Telegram credentials absent, admin alerts disabled");
    }
    let notifications = Arc::new(NotificationService::new(
        NotifyOnceGuard::new(ledger.clone()),
        telegram,
        Arc::new(InAppNotifier::new(db_pool.clone())),
    ));

    let momo = MomoGateway::new(config.momo.clone(), timeout)
        .expect("Failed to build MoMo gateway client");
    let zalopay = ZaloPayGateway::new(config.zalopay.clone(), timeout)
        .expect("Failed to build ZaloPay gateway client");
    let vnpay = VnPayGateway::new(config.vnpay.clone(), timeout)
        .expect("Failed to build VNPay gateway client");
    let payos = PayOsGateway::new(config.payos.clone(), timeout)
        .expect("Failed to build PayOS gateway client");

    let providers = vec![
        ProviderEntry {
            gateway: Arc::new(momo) as Arc<dyn PaymentGateway>,
            confirm_on_return: config.momo.confirm_on_return,
        },
        ProviderEntry {
            gateway: Arc::new(zalopay),
            confirm_on_return: config.zalopay.confirm_on_return,
        },
        ProviderEntry {
            gateway: Arc::new(vnpay),
            confirm_on_return: config.vnpay.confirm_on_return,
        },
        ProviderEntry {
            gateway: Arc::new(payos),
            confirm_on_return: config.payos.confirm_on_return,
        },
    ];

    let service = Arc::new(PaymentService::new(
        providers,
        state,
        orders,
        ledger,
        notifications,
        config.frontend.clone(),
    ));

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestId)
            .app_data(web::Data::new(service.clone()))
            .configure(payment_controller::configure)
    })
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await
}
