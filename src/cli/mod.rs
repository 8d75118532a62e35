pub mod app;
pub mod classify;
pub mod commands;
pub mod dispatch;
pub mod env;
pub mod health;
pub mod keys;
pub mod runtime;
pub mod verify;

pub use app::run;
pub use classify::{cmd_classify_reason, ClassifyReasonArgs};
pub use health::{cmd_health, HealthArgs};
pub use keys::{cmd_idempotency_key, IdempotencyKeyArgs};
pub use verify::{cmd_verify_webhook, VerifyWebhookArgs};
