// group-core/src/identity.rs

//! Process identity used as the leader value.
//!
//! A restarted process must never look like its predecessor, even if the
//! operating system hands out the same pid, so the default identity pairs
//! the pid with a random generation token.

use std::fmt;

use uuid::Uuid;

/// Identity written to the leader key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaderId(String);

impl LeaderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LeaderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for LeaderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Source of the identity a coordinator claims leadership with.
pub trait ProcessIdentity: Send + Sync {
    fn leader_id(&self) -> LeaderId;
}

/// `<pid>-<uuid>`, fixed for the lifetime of the value.
#[derive(Debug, Clone)]
pub struct ProcessGeneration {
    id: LeaderId,
}

impl ProcessGeneration {
    pub fn new() -> Self {
        Self::with_pid(std::process::id())
    }

    pub fn with_pid(pid: u32) -> Self {
        Self {
            id: LeaderId(format!("{}-{}", pid, Uuid::new_v4())),
        }
    }
}

impl Default for ProcessGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessIdentity for ProcessGeneration {
    fn leader_id(&self) -> LeaderId {
        self.id.clone()
    }
}

/// Fixed identity, for tests and externally assigned names.
#[derive(Debug, Clone)]
pub struct StaticIdentity(LeaderId);

impl StaticIdentity {
    pub fn new(id: impl Into<LeaderId>) -> Self {
        Self(id.into())
    }
}

impl ProcessIdentity for StaticIdentity {
    fn leader_id(&self) -> LeaderId {
        self.0.clone()
    }
}
