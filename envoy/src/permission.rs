//! Permission tiers: the capability class a tool declares. Gates available
//! packages in [`crate::runner`] and runtime access granted by the static
//! analyzer in [`crate::tool::register`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five permission tiers a tool (built-in or dynamic) can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Pure computation; no filesystem, network, or process access.
    Compute,
    /// Read access to files under the workspace root.
    ReadFile,
    /// Write access to files under the workspace root.
    WriteFile,
    /// Outbound network access (HTTP).
    Network,
    /// Subprocess execution.
    Process,
}

impl Permission {
    /// All tiers, in declaration order. Used to list valid tiers in error
    /// messages and to enumerate runner directories.
    pub const ALL: [Permission; 5] = [
        Permission::Compute,
        Permission::ReadFile,
        Permission::WriteFile,
        Permission::Network,
        Permission::Process,
    ];

    /// Directory-safe slug for this tier, used under `.envoy/runners/<tier>/`.
    pub fn slug(&self) -> &'static str {
        match self {
            Permission::Compute => "compute",
            Permission::ReadFile => "readFile",
            Permission::WriteFile => "writeFile",
            Permission::Network => "network",
            Permission::Process => "process",
        }
    }

    /// Parses a tier from its slug (case-sensitive, matching §4.5's
    /// "unknown permission yields Err listing valid tiers").
    pub fn parse(s: &str) -> Option<Permission> {
        Permission::ALL.into_iter().find(|p| p.slug() == s)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_tiers() {
        for tier in Permission::ALL {
            assert_eq!(Permission::parse(tier.slug()), Some(tier));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(Permission::parse("superuser"), None);
    }
}
