use anyhow::Result;

use super::classify::cmd_classify_reason;
use super::health::cmd_health;
use super::keys::cmd_idempotency_key;
use super::runtime::load_settings;
use super::verify::cmd_verify_webhook;
use crate::cli::commands::Commands;
use crate::cli::env::CliArgs;

/// Settings are only loaded for commands that build adapters, so the offline
/// helpers work without any configuration.
pub async fn dispatch(cli: &CliArgs) -> Result<()> {
    match cli.command.clone() {
        Commands::Health(args) => {
            let settings = load_settings(cli.config.as_deref())?;
            cmd_health(args, &settings).await
        }
        Commands::VerifyWebhook(args) => {
            let settings = load_settings(cli.config.as_deref())?;
            cmd_verify_webhook(args, &settings).await
        }
        Commands::ClassifyReason(args) => cmd_classify_reason(args),
        Commands::IdempotencyKey(args) => cmd_idempotency_key(args),
    }
}
