use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Role supplied by the identity/session service alongside the actor id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Manager,
    Reviewer,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Manager => "MANAGER",
            Role::Reviewer => "REVIEWER",
            Role::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Role::Client),
            "MANAGER" => Ok(Role::Manager),
            "REVIEWER" => Ok(Role::Reviewer),
            "SYSTEM" => Ok(Role::System),
            other => Err(CoreError::IdentityError(format!("unknown role {}", other))),
        }
    }
}

/// Authenticated caller of an engine operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    /// Actor used for scheduled (time-driven) transitions.
    pub fn system() -> Self {
        Self::new("system", Role::System)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role || self.role == Role::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("reviewer".parse::<Role>().unwrap(), Role::Reviewer);
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn test_system_actor_has_every_role() {
        let system = Actor::system();
        assert!(system.has_role(Role::Manager));
        assert!(!Actor::new("c-1", Role::Client).has_role(Role::Reviewer));
    }
}
