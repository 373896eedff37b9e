//! Request-level authentication context.

use studyshala_core::{SessionId, UserId};

use crate::role::Role;
use crate::user::User;

/// The caller behind a verified bearer credential.
///
/// Built by [`crate::Gateway::authenticate`] from the stored account, so
/// [`AuthenticatedUser::role`] reflects the latest role and active flag.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    user: User,
    session_id: SessionId,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn new(user: User, session_id: SessionId) -> Self {
        Self { user, session_id }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user.id()
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn into_user(self) -> User {
        self.user
    }

    /// The session the credential belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.user.role()
    }
}

/// Login initiation data for redirecting to the provider.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The URL to redirect the user to for authentication.
    pub authorization_url: String,
    /// The one-time state token embedded in the URL.
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_user_exposes_stored_role() {
        let user = User::new(
            "sub_123".to_string(),
            "asha@example.edu".to_string(),
            "Asha".to_string(),
            Role::Faculty,
        );
        let session_id = SessionId::new();
        let auth = AuthenticatedUser::new(user.clone(), session_id);

        assert_eq!(auth.user_id(), user.id());
        assert_eq!(auth.session_id(), session_id);
        assert_eq!(auth.role(), Role::Faculty);
        assert_eq!(auth.into_user(), user);
    }
}
