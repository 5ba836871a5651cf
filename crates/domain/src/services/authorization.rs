//! Authorization collaborator.
//!
//! The core never prompts for access itself; before tracking starts it asks
//! this collaborator whether the required platform capabilities are
//! currently granted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Platform capability the core may need before sampling can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    FineLocation,
    CoarseLocation,
    TelephonyRead,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::FineLocation => write!(f, "fine_location"),
            Access::CoarseLocation => write!(f, "coarse_location"),
            Access::TelephonyRead => write!(f, "telephony_read"),
        }
    }
}

/// Authorization collaborator queried before tracking starts.
#[async_trait::async_trait]
pub trait Authorization: Send + Sync {
    /// Whether the given capability is currently granted.
    async fn is_granted(&self, access: Access) -> bool;

    /// Whether every listed capability is granted.
    async fn all_granted(&self, accesses: &[Access]) -> bool {
        for access in accesses {
            if !self.is_granted(*access).await {
                return false;
            }
        }
        true
    }
}

/// Static grant set for development and testing.
///
/// Logs denials but never prompts.
#[derive(Debug, Clone, Default)]
pub struct StaticGrants {
    granted: HashSet<Access>,
}

impl StaticGrants {
    /// Grants every capability.
    pub fn all() -> Self {
        Self {
            granted: HashSet::from([
                Access::FineLocation,
                Access::CoarseLocation,
                Access::TelephonyRead,
            ]),
        }
    }

    /// Grants nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Grants exactly the listed capabilities.
    pub fn of(accesses: &[Access]) -> Self {
        Self {
            granted: accesses.iter().copied().collect(),
        }
    }
}

#[async_trait::async_trait]
impl Authorization for StaticGrants {
    async fn is_granted(&self, access: Access) -> bool {
        let granted = self.granted.contains(&access);
        if !granted {
            tracing::warn!(access = %access, "Access not granted");
        }
        granted
    }
}
