//! Approval mode and the gate that applies it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Process-wide approval mode for mutating operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Everything runs without asking.
    #[default]
    Unrestricted,
    /// Each mutating operation needs an explicit yes.
    ConfirmEach,
    /// Mutating operations are refused.
    Blocked,
}

impl PermissionMode {
    /// Next mode in the fixed cycle `Unrestricted → ConfirmEach → Blocked`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Unrestricted => Self::ConfirmEach,
            Self::ConfirmEach => Self::Blocked,
            Self::Blocked => Self::Unrestricted,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::ConfirmEach => "confirm-each",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrestricted" | "auto" => Ok(Self::Unrestricted),
            "confirm-each" | "confirm" | "ask" => Ok(Self::ConfirmEach),
            "blocked" | "manual" => Ok(Self::Blocked),
            other => Err(format!("unknown permission mode '{other}'")),
        }
    }
}

/// Gate classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Inspects state only.
    ReadOnly,
    /// Changes the filesystem or spawns a process.
    Mutating,
}

/// Gate decision for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Run it.
    Proceed,
    /// Ask the user with this description; anything but yes is a denial.
    Prompt(String),
    /// Refuse it.
    Deny,
}

/// Applies the current [`PermissionMode`] to operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionGate {
    mode: PermissionMode,
}

impl PermissionGate {
    /// Create a gate in `mode`.
    #[must_use]
    pub const fn new(mode: PermissionMode) -> Self {
        Self { mode }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> PermissionMode {
        self.mode
    }

    /// Replace the mode.
    pub const fn set_mode(&mut self, mode: PermissionMode) {
        self.mode = mode;
    }

    /// Advance to the next mode and return it.
    pub const fn cycle(&mut self) -> PermissionMode {
        self.mode = self.mode.next();
        self.mode
    }

    /// Decide whether an operation of `kind` may run.
    pub fn authorize(&self, kind: OperationKind, description: impl Into<String>) -> Authorization {
        match (kind, self.mode) {
            (OperationKind::ReadOnly, _) | (OperationKind::Mutating, PermissionMode::Unrestricted) => {
                Authorization::Proceed
            }
            (OperationKind::Mutating, PermissionMode::ConfirmEach) => {
                Authorization::Prompt(description.into())
            }
            (OperationKind::Mutating, PermissionMode::Blocked) => Authorization::Deny,
        }
    }
}
