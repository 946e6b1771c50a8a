//! Assertion levels and the filter that gates clause evaluation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cost classification of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionLevel {
    /// Runs whenever checking of its category is enabled.
    #[default]
    Default,

    /// Runs only when audit checking is enabled.
    Audit,

    /// Never runs. Documents a property that cannot, or should not, be
    /// evaluated.
    Axiom,
}

impl fmt::Display for AssertionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssertionLevel::Default => "default",
            AssertionLevel::Audit => "audit",
            AssertionLevel::Axiom => "axiom",
        })
    }
}

/// Decides whether a clause of a given level is invoked at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFilter {
    audit_enabled: bool,
}

impl LevelFilter {
    pub fn new(audit_enabled: bool) -> Self {
        Self { audit_enabled }
    }

    pub fn permits(&self, level: AssertionLevel) -> bool {
        match level {
            AssertionLevel::Default => true,
            AssertionLevel::Audit => self.audit_enabled,
            AssertionLevel::Axiom => false,
        }
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }
}
