use clap::Subcommand;

use super::classify::ClassifyReasonArgs;
use super::health::HealthArgs;
use super::keys::IdempotencyKeyArgs;
use super::verify::VerifyWebhookArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Probe every configured portal and print the health reports
    Health(HealthArgs),

    /// Verify and parse a captured webhook delivery
    VerifyWebhook(VerifyWebhookArgs),

    /// Show how a portal reason code maps onto the canonical categories
    ClassifyReason(ClassifyReasonArgs),

    /// Mint an idempotency key the way adapters do for mutating calls
    IdempotencyKey(IdempotencyKeyArgs),
}
