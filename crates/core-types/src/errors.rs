use thiserror::Error;

use crate::portal::PortalKind;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Error taxonomy surfaced by every portal operation.
#[derive(Debug, Error, Clone)]
pub enum PortalError {
    #[error("transient network failure: {message}")]
    TransientNetwork { status: Option<u16>, message: String },
    #[error("portal rejected request with status {status}: {message}")]
    PermanentClient { status: u16, message: String },
    #[error("authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },
    #[error("webhook signature verification failed: {0}")]
    SignatureVerification(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{portal} does not support {operation}")]
    Unsupported {
        portal: PortalKind,
        operation: &'static str,
    },
}

pub type PortalResult<T> = Result<T, PortalError>;

impl PortalError {
    /// Classifies a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = preview(body);
        match status {
            401 | 403 => PortalError::Authentication {
                status: Some(status),
                message,
            },
            408 | 429 | 500..=599 => PortalError::TransientNetwork {
                status: Some(status),
                message,
            },
            _ => PortalError::PermanentClient { status, message },
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        PortalError::TransientNetwork {
            status: None,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        PortalError::Authentication {
            status: None,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        PortalError::MalformedPayload(message.into())
    }

    /// HTTP status carried by the failure, when the portal answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            PortalError::TransientNetwork { status, .. } => *status,
            PortalError::PermanentClient { status, .. } => Some(*status),
            PortalError::Authentication { status, .. } => *status,
            _ => None,
        }
    }

    /// True for failures where no response was received (connect, timeout).
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, PortalError::TransientNetwork { status: None, .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, PortalError::Authentication { .. })
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::MalformedPayload(err.to_string())
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_LIMIT {
        return body.to_string();
    }
    let mut buf: String = body.chars().take(BODY_PREVIEW_LIMIT).collect();
    buf.push('…');
    buf
}
