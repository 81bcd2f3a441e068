//! Access rule engine
//!
//! Decides whether an identity may create, read, update, delete or view an
//! entity type or instance, based on stored access rules:
//! - Rule store with a pluggable source and an explicit cache policy
//! - Three-tier evaluator (type, collection, instance)
//! - Validator for rule writes
//! - Guard applying the configured enforcement mode (off/advisory/strict)

mod cache;
mod evaluator;
mod guard;
mod identity;
mod matcher;
mod source;
pub mod validator;

pub use cache::{CachePolicy, Clock, ManualClock, RuleStore, SystemClock};
pub use evaluator::{AccessEvaluator, Operation};
pub use guard::AccessGuard;
pub use identity::{AccessTarget, EntityRef, Identity};
pub use matcher::{PrecedenceMatcher, RuleMatcher};
pub use source::{MemoryRuleSource, RuleSource, SqliteRuleSource};

use std::fmt;
use std::str::FromStr;

/// Access rule enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRulesMode {
    /// No rule checks
    Off,
    /// Log denials but allow requests
    Advisory,
    /// Deny with 403
    Strict,
}

impl AccessRulesMode {
    pub fn is_enabled(&self) -> bool {
        *self != AccessRulesMode::Off
    }
}

impl FromStr for AccessRulesMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "false" | "0" => Ok(AccessRulesMode::Off),
            "advisory" => Ok(AccessRulesMode::Advisory),
            "strict" | "on" | "true" | "1" => Ok(AccessRulesMode::Strict),
            other => Err(format!("unknown access rules mode: {other}")),
        }
    }
}

impl fmt::Display for AccessRulesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRulesMode::Off => f.write_str("off"),
            AccessRulesMode::Advisory => f.write_str("advisory"),
            AccessRulesMode::Strict => f.write_str("strict"),
        }
    }
}

/// Well-known role designations
pub mod roles {
    pub const SYS_ADMIN: &str = "SysAdmin";
    pub const APP_ADMIN: &str = "AppAdmin";
}
