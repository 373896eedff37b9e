//! Signed bearer credentials.
//!
//! Credentials are HS256 JWTs carrying the user's id, email, role, and name,
//! plus the id of the server-side session they belong to.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthenticationError, LoginError};
use crate::role::Role;
use crate::session::Session;
use crate::user::User;

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Session ID.
    pub jti: String,
    pub email: String,
    /// Role at issue time. Guards use the stored role, not this one.
    pub role: Role,
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Issues and verifies bearer credentials.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer signing with `secret`; credentials live for `lifetime`.
    #[must_use]
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }

    /// How long issued credentials stay valid.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Signs a credential for `user` bound to `session`.
    ///
    /// The expiry matches the session's.
    pub fn issue(&self, user: &User, session: &Session) -> Result<String, Report<LoginError>> {
        let claims = Claims {
            sub: user.id().to_string(),
            jti: session.id().to_string(),
            email: user.email().to_string(),
            role: user.role(),
            name: user.name().to_string(),
            iat: session.created_at().timestamp(),
            exp: session.expires_at().timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| LoginError::TokenSigning {
                details: e.to_string(),
            },
        )?;
        Ok(token)
    }

    /// Verifies the signature and expiry of `token` and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, Report<AuthenticationError>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            AuthenticationError::InvalidOrExpired {
                reason: e.to_string(),
            }
        })?;
        Ok(data.claims)
    }

    /// Session lifetime for a login happening now.
    #[must_use]
    pub fn new_session(&self, user: &User) -> Session {
        Session::new(user.id(), self.lifetime)
    }

    /// Seconds until `claims` expire, clamped at zero.
    #[must_use]
    pub fn remaining_seconds(claims: &Claims) -> i64 {
        (claims.exp - Utc::now().timestamp()).max(0)
    }
}
