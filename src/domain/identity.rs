use serde::{Deserialize, Serialize};

use crate::domain::preferences::AgeGroup;
use crate::persistence::codec::Schema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdentity {
    pub guest_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    Guest,
    Authenticated,
}

/// The active user. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum UserIdentity {
    Guest(GuestIdentity),
    Authenticated(AuthenticatedIdentity),
}

impl UserIdentity {
    pub fn guest(guest_id: impl Into<String>, created_at: u64) -> Self {
        UserIdentity::Guest(GuestIdentity {
            guest_id: guest_id.into(),
            display_name: "Guest".to_string(),
            avatar: None,
            created_at,
        })
    }

    /// Namespace component used in storage keys: `guest:<id>` or `user:<id>`.
    pub fn identity_key(&self) -> String {
        match self {
            UserIdentity::Guest(g) => format!("guest:{}", g.guest_id),
            UserIdentity::Authenticated(a) => format!("user:{}", a.user_id),
        }
    }

    pub fn mode(&self) -> IdentityMode {
        match self {
            UserIdentity::Guest(_) => IdentityMode::Guest,
            UserIdentity::Authenticated(_) => IdentityMode::Authenticated,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, UserIdentity::Guest(_))
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            UserIdentity::Authenticated(a) => Some(&a.user_id),
            UserIdentity::Guest(_) => None,
        }
    }

    pub fn guest_id(&self) -> Option<&str> {
        match self {
            UserIdentity::Guest(g) => Some(&g.guest_id),
            UserIdentity::Authenticated(_) => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            UserIdentity::Guest(g) => &g.display_name,
            UserIdentity::Authenticated(a) => &a.display_name,
        }
    }
}

/// Value stored under the `session` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub identity: UserIdentity,
    /// Last activity, ms since epoch.
    pub timestamp: u64,
}

impl Schema for PersistedSession {
    const NAME: &'static str = "PersistedSession";

    fn validate(&self) -> Result<(), String> {
        match &self.identity {
            UserIdentity::Guest(g) if g.guest_id.is_empty() => Err("empty guestId".into()),
            UserIdentity::Authenticated(a) if a.user_id.is_empty() => Err("empty userId".into()),
            _ => Ok(()),
        }
    }
}

/// Row shape of `user_profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Schema for UserProfile {
    const NAME: &'static str = "UserProfile";

    fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("empty user_id".into());
        }
        Ok(())
    }
}

impl UserProfile {
    pub fn to_identity(&self) -> UserIdentity {
        let display_name = if self.display_name.is_empty() {
            self.email.split('@').next().unwrap_or_default().to_string()
        } else {
            self.display_name.clone()
        };
        UserIdentity::Authenticated(AuthenticatedIdentity {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            display_name,
            avatar: self.avatar.clone(),
            created_at: self.created_at,
        })
    }
}
