use serde::{Deserialize, Serialize};

/// The short-lived result of verifying a bearer token during the handshake.
///
/// Claims are produced fresh for every handshake and never stored; a
/// connection's `tenant_id` and `user_id` are fixed from these claims for the
/// socket's entire lifetime. The tenant always comes from the user record on
/// the server side, never from anything the client sent.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub user_id: String,
    pub tenant_id: String,
    pub is_active: bool,
}

/// A user as seen by the notification service.
///
/// This is the minimal projection of the CRM's user store the handshake needs:
/// identity, owning tenant, and whether the account is still active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub tenant_id: String,
    pub is_active: bool,
}
