pub mod services;

pub use services::{InAppNotifier, NotificationService, NotifyOnceGuard, PaidNotifier, TelegramNotifier};
