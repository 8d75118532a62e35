use anyhow::Result;
use chargeguard_core_types::{CardBrand, PortalKind};
use clap::Args;
use normalization::NetworkFamily;
use portal_adapter::normalizer_for;
use tracing::warn;

use super::env::parse_portal;

#[derive(Args, Clone, Debug)]
pub struct ClassifyReasonArgs {
    #[arg(long, value_parser = parse_portal)]
    pub portal: PortalKind,

    /// Card brand; narrows the network tables consulted (visa, mastercard, amex, discover)
    #[arg(long)]
    pub brand: Option<String>,

    /// Portal-native reason code
    pub code: String,
}

pub fn cmd_classify_reason(args: ClassifyReasonArgs) -> Result<()> {
    let family = args.brand.as_deref().and_then(|brand| {
        let family = NetworkFamily::from_brand(CardBrand::from_portal(brand));
        if family.is_none() {
            warn!(brand, "unrecognized card brand; consulting every network table");
        }
        family
    });
    let mapping = normalizer_for(args.portal).normalize_reason_code(&args.code, family);
    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}
