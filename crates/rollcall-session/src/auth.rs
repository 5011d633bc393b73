//! Authentication hook for validating a connection's identity.
//!
//! Rollcall does not own user accounts. Login and password hashing live
//! elsewhere; what reaches the hub is a signed token in the connection's
//! query string. The [`Authenticator`] trait turns that token into an
//! [`Identity`], and the server calls it once per connection during the
//! handshake.
//!
//! [`JwtAuthenticator`] verifies HS256 tokens and then confirms the user
//! still exists in an [`IdentityDirectory`]. The directory, not the token,
//! is authoritative for the role.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rollcall_protocol::{Identity, ParticipantId, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::SessionError;

/// Validates a client's credential and returns their identity.
///
/// The returned future must be `Send`: the server awaits it inside a
/// spawned connection task.
///
/// # Example
///
/// ```rust
/// use rollcall_protocol::Identity;
/// use rollcall_session::{Authenticator, SessionError};
///
/// /// Treats the token as "role:id". Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         match token.split_once(':') {
///             Some(("teacher", id)) => Ok(Identity::teacher(id)),
///             Some(("student", id)) => Ok(Identity::student(id)),
///             _ => Err(SessionError::AuthFailed("bad dev token".into())),
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the token and returns the caller's identity.
    ///
    /// # Errors
    /// Returns [`SessionError::MissingCredential`] for an empty token,
    /// [`SessionError::AuthFailed`] for a rejected one, and
    /// [`SessionError::IdentityNotFound`] when the user is gone.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;
}

/// Looks up the current identity record for a participant.
pub trait IdentityDirectory: Send + Sync + 'static {
    /// Returns `None` if the participant no longer exists.
    fn find(
        &self,
        participant_id: &ParticipantId,
    ) -> impl Future<Output = Option<Identity>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryDirectory
// ---------------------------------------------------------------------------

/// An in-process [`IdentityDirectory`]. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    users: Arc<RwLock<HashMap<ParticipantId, Role>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, identity: Identity) {
        self.users
            .write()
            .await
            .insert(identity.participant_id, identity.role);
    }

    /// Deletes a user. Tokens already issued to them stop working.
    pub async fn remove(&self, participant_id: &ParticipantId) -> bool {
        self.users.write().await.remove(participant_id).is_some()
    }
}

impl IdentityDirectory for MemoryDirectory {
    async fn find(&self, participant_id: &ParticipantId) -> Option<Identity> {
        let users = self.users.read().await;
        users.get(participant_id).map(|role| Identity {
            participant_id: participant_id.clone(),
            role: *role,
        })
    }
}

// ---------------------------------------------------------------------------
// JwtAuthenticator
// ---------------------------------------------------------------------------

/// Claims carried by a Rollcall access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub role: Role,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Verifies HS256 JWTs signed with a shared secret.
pub struct JwtAuthenticator<D: IdentityDirectory> {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    directory: D,
}

impl<D: IdentityDirectory> JwtAuthenticator<D> {
    pub fn new(secret: &[u8], directory: D) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            directory,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Mints a token for `identity` that expires after `ttl`.
    pub fn issue_token(
        &self,
        identity: &Identity,
        ttl: chrono::Duration,
    ) -> Result<String, SessionError> {
        let claims = TokenClaims {
            user_id: identity.participant_id.0.clone(),
            role: identity.role,
            exp: (chrono::Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::TokenIssue(e.to_string()))
    }
}

impl<D: IdentityDirectory> Authenticator for JwtAuthenticator<D> {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        if token.is_empty() {
            return Err(SessionError::MissingCredential);
        }

        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                SessionError::AuthFailed(e.to_string())
            })?;

        let participant_id = ParticipantId::new(data.claims.user_id);
        match self.directory.find(&participant_id).await {
            Some(identity) => Ok(identity),
            None => {
                tracing::debug!(%participant_id, "token names an unknown user");
                Err(SessionError::IdentityNotFound(participant_id))
            }
        }
    }
}
