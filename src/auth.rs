//! Authentication boundary.
//!
//! The pipeline trusts whatever owner identity the [`Authenticator`]
//! resolves from a bearer credential. Token issuance (registration, login)
//! lives outside this service; [`sign_token`] exists so operators and tests
//! can mint credentials against a shared secret.

use axum::http::header;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use std::sync::Arc;
use thiserror::Error;

use crate::api::response::ApiError;
use crate::AppState;

const TOKEN_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
}

/// An authenticated owner identity, taken verbatim from the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
}

/// Resolves an opaque bearer credential into an owner identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<Owner, AuthError>;
}

/// Verifies tokens of the form `v1.<owner_id>.<base64url(HMAC-SHA256)>`
/// where the signature covers `v1.<owner_id>`.
pub struct HmacAuthenticator {
    key: hmac::Key,
}

impl HmacAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }
}

impl Authenticator for HmacAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<Owner, AuthError> {
        // Signature is the last dot-separated segment; owner ids may not
        // contain dots but the prefix is matched explicitly regardless.
        let (payload, signature) = credential
            .rsplit_once('.')
            .ok_or(AuthError::InvalidCredential)?;

        let owner_id = payload
            .strip_prefix(&format!("{TOKEN_VERSION}."))
            .ok_or(AuthError::InvalidCredential)?;
        if owner_id.is_empty() || owner_id.contains('.') {
            return Err(AuthError::InvalidCredential);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidCredential)?;

        // Constant-time comparison via ring
        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidCredential)?;

        Ok(Owner {
            id: owner_id.to_string(),
        })
    }
}

/// Mint a bearer token for an owner id. Counterpart to
/// [`HmacAuthenticator::authenticate`].
pub fn sign_token(secret: &str, owner_id: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let payload = format!("{TOKEN_VERSION}.{owner_id}");
    let tag = hmac::sign(&key, payload.as_bytes());
    format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref()))
}

/// Extractor that resolves the `Authorization: Bearer` header through the
/// configured authenticator. Missing and invalid credentials get the same
/// uniform 401.
#[axum::async_trait]
impl axum::extract::FromRequestParts<Arc<AppState>> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let credential = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Invalid or missing credentials"))?;

        state
            .authenticator
            .authenticate(credential)
            .map_err(|_| ApiError::unauthorized("Invalid or missing credentials"))
    }
}
