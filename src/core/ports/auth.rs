use crate::core::domain::auth::{AuthClaims, UserRecord};
use crate::utils::error::NotifierResult;
use async_trait::async_trait;

/// A trait for verifying a bearer token presented during the WebSocket handshake.
///
/// Implementations must check the token's signature and expiry, resolve the
/// user it names, confirm the user is active, and resolve the tenant from the
/// user record. A failed verification returns
/// `NotifierError::Authentication`; the handshake rejects the socket and
/// never registers it.
///
/// The trait is annotated with `#[cfg_attr(feature = "test-helpers", mockall::automock)]`
/// to allow automatic generation of mock implementations for testing purposes.
#[async_trait]
#[cfg_attr(feature = "test-helpers", mockall::automock)]
pub trait TokenVerifierPort: Send + Sync {
    /// Verifies a token and returns fresh claims for this handshake.
    async fn verify(&self, token: &str) -> NotifierResult<AuthClaims>;
}

/// A trait for looking up users by id.
///
/// This is the only view of the CRM's user store the notification service
/// has. `Ok(None)` means the user does not exist; lookup failures are
/// authentication failures from the handshake's point of view.
#[async_trait]
#[cfg_attr(feature = "test-helpers", mockall::automock)]
pub trait UserDirectoryPort: Send + Sync {
    async fn lookup(&self, user_id: &str) -> NotifierResult<Option<UserRecord>>;
}
