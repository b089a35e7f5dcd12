pub mod notifier;
pub mod notify_guard;

pub use notifier::{InAppNotifier, PaidNotifier, TelegramNotifier};
pub use notify_guard::{NotificationService, NotifyOnceGuard};
