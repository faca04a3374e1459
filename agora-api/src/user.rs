/// Shown when a comment author has neither a nickname nor a username
pub const ANONYMOUS_NAME: &str = "익명";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub i64);

impl UserId {
    pub fn stub() -> UserId {
        UserId(-1)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub String);

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    bolero::generator::TypeGenerator,
    serde::Deserialize,
    serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    /// Admins can do everything moderators can
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Role, String> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role {s:?}")),
        }
    }
}

/// The actor a thread is displayed for and on whose behalf actions are sent
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Viewer {
    /// None for anonymous viewers
    pub id: Option<UserId>,
    pub role: Role,
    pub token: Option<AuthToken>,
}

impl Viewer {
    pub fn anonymous() -> Viewer {
        Viewer {
            id: None,
            role: Role::User,
            token: None,
        }
    }

    pub fn user(id: UserId, token: AuthToken) -> Viewer {
        Viewer {
            id: Some(id),
            role: Role::User,
            token: Some(token),
        }
    }

    pub fn with_role(mut self, role: Role) -> Viewer {
        self.role = role;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some() && self.token.is_some()
    }

    pub fn can_moderate(&self) -> bool {
        self.is_authenticated() && self.role.can_moderate()
    }
}

/// Resolves the name displayed for a comment author: nickname, then username,
/// then the anonymous placeholder. Blank names count as missing.
pub fn display_name(nickname: Option<&str>, username: Option<&str>) -> String {
    [nickname, username]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS_NAME)
        .to_string()
}
