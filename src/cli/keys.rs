use anyhow::Result;
use chargeguard_core_types::PortalKind;
use clap::Args;
use portal_net::IdempotencyKeyGenerator;

use super::env::parse_portal;

#[derive(Args, Clone, Debug)]
pub struct IdempotencyKeyArgs {
    #[arg(long, value_parser = parse_portal)]
    pub portal: PortalKind,

    /// Operation prefix, e.g. `evidence` or `accept`
    #[arg(long, default_value = "op")]
    pub prefix: String,
}

pub fn cmd_idempotency_key(args: IdempotencyKeyArgs) -> Result<()> {
    println!("{}", IdempotencyKeyGenerator::new(args.portal).generate(&args.prefix));
    Ok(())
}
