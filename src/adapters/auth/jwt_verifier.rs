use crate::core::domain::auth::AuthClaims;
use crate::core::ports::auth::{TokenVerifierPort, UserDirectoryPort};
use crate::utils::error::{NotifierError, NotifierResult};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

/// The token claims the handshake relies on.
///
/// `exp` is enforced by the validation settings and does not need to be read
/// back out of the token.
#[derive(Debug, Deserialize)]
struct BearerClaims {
    /// The user id the token was issued for.
    sub: String,
}

/// A `TokenVerifierPort` implementation for HS256-signed JWTs.
///
/// Verification is the full handshake chain: signature and expiry via
/// `jsonwebtoken`, then a user lookup to confirm the account exists and is
/// active. The resulting claims carry the tenant from the user record; the
/// token itself is never trusted for tenancy.
pub struct JwtVerifierAdapter {
    decoding_key: DecodingKey,
    validation: Validation,
    directory: Arc<dyn UserDirectoryPort>,
}

impl JwtVerifierAdapter {
    pub fn new(secret: &[u8], directory: Arc<dyn UserDirectoryPort>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            directory,
        }
    }
}

#[async_trait]
impl TokenVerifierPort for JwtVerifierAdapter {
    async fn verify(&self, token: &str) -> NotifierResult<AuthClaims> {
        let data = decode::<BearerClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| NotifierError::Authentication(format!("invalid token: {e}")))?;

        let user_id = data.claims.sub;
        let user = self
            .directory
            .lookup(&user_id)
            .await?
            .ok_or_else(|| NotifierError::Authentication(format!("unknown user: {user_id}")))?;

        if !user.is_active {
            return Err(NotifierError::Authentication(format!(
                "inactive user: {user_id}"
            )));
        }

        Ok(AuthClaims {
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            is_active: true,
        })
    }
}
