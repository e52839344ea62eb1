use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of an executor
///
/// The primary executor is long-lived. The secondary one only exists while the
/// host application runs a session, and takes over the tools that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Primary,
    Secondary,
}

impl ExecutorKind {
    /// Both kinds, in routing-fallback order
    pub const ALL: [ExecutorKind; 2] = [ExecutorKind::Primary, ExecutorKind::Secondary];

    /// The kind a request falls back to when this one has no live executor
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    /// Infer the kind from an executor's self-reported version string
    ///
    /// A version containing `secondary_marker` (case-insensitive) identifies
    /// the session-scoped executor. Everything else is primary.
    pub fn from_plugin_version(plugin_version: &str, secondary_marker: &str) -> Self {
        if !secondary_marker.is_empty()
            && plugin_version
                .to_ascii_lowercase()
                .contains(&secondary_marker.to_ascii_lowercase())
        {
            Self::Secondary
        } else {
            Self::Primary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
