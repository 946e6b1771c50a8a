//! Contract-related error types

use thiserror::Error;

use crate::contract::{ContractKind, FailureContext};

/// Main contract error type
#[derive(Error, Debug)]
pub enum ContractError {
    /// Contract violation propagated by a failure handler
    #[error("Contract violation: {0}")]
    Violation(#[from] ContractViolation),

    /// Malformed specification or binding
    #[error("Contract usage error: {0}")]
    Usage(String),

    /// Invalid runtime configuration
    #[error("Contract configuration error: {0}")]
    Config(String),
}

impl ContractError {
    /// The violation carried by this error, if any
    pub fn violation(&self) -> Option<&ContractViolation> {
        match self {
            Self::Violation(v) => Some(v),
            _ => None,
        }
    }

    /// Category of the carried violation
    pub fn violation_kind(&self) -> Option<ContractKind> {
        self.violation().map(ContractViolation::kind)
    }
}

/// Represents a contract violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// Precondition violation
    #[error("Precondition violated{}{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        if let Some(class) = class { format!(" [{}]", class) } else { String::new() },
        message
    )]
    Precondition {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },

    /// Postcondition violation
    #[error("Postcondition violated{}{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        if let Some(class) = class { format!(" [{}]", class) } else { String::new() },
        message
    )]
    Postcondition {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },

    /// Invariant violation
    #[error("Invariant violated{}{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        if let Some(class) = class { format!(" [{}]", class) } else { String::new() },
        message
    )]
    Invariant {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },

    /// Old value could not be captured
    #[error("Old value capture failed{}{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        if let Some(class) = class { format!(" [{}]", class) } else { String::new() },
        message
    )]
    OldValue {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },

    /// Exception guarantee violation
    #[error("Exception guarantee violated{}{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        if let Some(class) = class { format!(" [{}]", class) } else { String::new() },
        message
    )]
    Except {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },

    /// Ad-hoc check failure
    #[error("Check failed{}: {}",
        if let Some(func) = function { format!(" in {} '{}'", context, func) } else { String::new() },
        message
    )]
    Check {
        function: Option<String>,
        message: String,
        class: Option<String>,
        context: FailureContext,
    },
}

impl ContractViolation {
    /// Create a new contract violation
    pub fn new(
        kind: ContractKind,
        function: Option<String>,
        message: String,
        context: FailureContext,
    ) -> Self {
        let class = None;
        match kind {
            ContractKind::Precondition => Self::Precondition { function, message, class, context },
            ContractKind::Postcondition => Self::Postcondition { function, message, class, context },
            ContractKind::Invariant => Self::Invariant { function, message, class, context },
            ContractKind::OldValue => Self::OldValue { function, message, class, context },
            ContractKind::Except => Self::Except { function, message, class, context },
            ContractKind::Check => Self::Check { function, message, class, context },
        }
    }

    /// Set the class whose clause failed
    pub fn with_class(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Precondition { class, .. }
            | Self::Postcondition { class, .. }
            | Self::Invariant { class, .. }
            | Self::OldValue { class, .. }
            | Self::Except { class, .. }
            | Self::Check { class, .. } => *class = Some(name.into()),
        }
        self
    }

    /// Category of this violation
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::Precondition { .. } => ContractKind::Precondition,
            Self::Postcondition { .. } => ContractKind::Postcondition,
            Self::Invariant { .. } => ContractKind::Invariant,
            Self::OldValue { .. } => ContractKind::OldValue,
            Self::Except { .. } => ContractKind::Except,
            Self::Check { .. } => ContractKind::Check,
        }
    }

    /// Get the function name if available
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Self::Precondition { function, .. }
            | Self::Postcondition { function, .. }
            | Self::Invariant { function, .. }
            | Self::OldValue { function, .. }
            | Self::Except { function, .. }
            | Self::Check { function, .. } => function.as_deref(),
        }
    }

    /// Get the class of the failing level if available
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::Precondition { class, .. }
            | Self::Postcondition { class, .. }
            | Self::Invariant { class, .. }
            | Self::OldValue { class, .. }
            | Self::Except { class, .. }
            | Self::Check { class, .. } => class.as_deref(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Precondition { message, .. }
            | Self::Postcondition { message, .. }
            | Self::Invariant { message, .. }
            | Self::OldValue { message, .. }
            | Self::Except { message, .. }
            | Self::Check { message, .. } => message,
        }
    }

    /// Context tag of the operation that detected the violation
    pub fn context(&self) -> FailureContext {
        match self {
            Self::Precondition { context, .. }
            | Self::Postcondition { context, .. }
            | Self::Invariant { context, .. }
            | Self::OldValue { context, .. }
            | Self::Except { context, .. }
            | Self::Check { context, .. } => *context,
        }
    }
}

/// Result type for contract operations
pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
#[path = "errors/errors_tests.rs"]
mod tests;
