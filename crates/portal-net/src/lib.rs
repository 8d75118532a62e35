pub mod idempotency;
pub mod retry;
pub mod transport;
pub mod types;

pub use idempotency::IdempotencyKeyGenerator;
pub use retry::RetryPolicy;
pub use transport::{send_with_timeout, HttpTransport, ReqwestTransport};
pub use types::{Body, NetRequest, NetResponse};
