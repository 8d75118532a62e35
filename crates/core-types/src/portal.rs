use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PortalError;

/// Every portal variant the adapter layer knows how to talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalKind {
    Stripe,
    Paypal,
    Mastercom,
    AuthorizeNet,
    Square,
    Verifi,
}

impl PortalKind {
    pub const ALL: [PortalKind; 6] = [
        PortalKind::Stripe,
        PortalKind::Paypal,
        PortalKind::Mastercom,
        PortalKind::AuthorizeNet,
        PortalKind::Square,
        PortalKind::Verifi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PortalKind::Stripe => "stripe",
            PortalKind::Paypal => "paypal",
            PortalKind::Mastercom => "mastercom",
            PortalKind::AuthorizeNet => "authorize_net",
            PortalKind::Square => "square",
            PortalKind::Verifi => "verifi",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            PortalKind::Stripe => "https://api.stripe.com",
            PortalKind::Paypal => "https://api-m.paypal.com",
            PortalKind::Mastercom => "https://api.mastercard.com/mastercom",
            PortalKind::AuthorizeNet => "https://api.authorize.net",
            PortalKind::Square => "https://connect.squareup.com",
            PortalKind::Verifi => "https://api.verifi.com",
        }
    }

    /// Environment variable that overrides [`Self::default_base_url`].
    pub fn base_url_env(self) -> &'static str {
        match self {
            PortalKind::Stripe => "STRIPE_API_BASE_URL",
            PortalKind::Paypal => "PAYPAL_API_BASE_URL",
            PortalKind::Mastercom => "MASTERCOM_API_BASE_URL",
            PortalKind::AuthorizeNet => "AUTHORIZE_NET_API_BASE_URL",
            PortalKind::Square => "SQUARE_API_BASE_URL",
            PortalKind::Verifi => "VERIFI_API_BASE_URL",
        }
    }
}

impl fmt::Display for PortalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortalKind {
    type Err = PortalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        PortalKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| PortalError::Configuration(format!("unknown portal '{value}'")))
    }
}
