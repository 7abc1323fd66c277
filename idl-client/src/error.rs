use solana_sdk::pubkey::Pubkey;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdlClientError>;

#[derive(Debug, Error)]
pub enum IdlClientError {
    #[error("schema violation at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },
    #[error("truncated data at {path}: needed {needed} bytes, {available} available")]
    TruncatedData {
        path: String,
        needed: usize,
        available: usize,
    },
    #[error("account {address} is not a {expected}: found {found}")]
    TypeMismatch {
        address: String,
        expected: String,
        found: String,
    },
    #[error("no account data found at {0}")]
    AccountNotFound(Pubkey),
    #[error("invalid call to {instruction}: {reason}")]
    InvalidCall { instruction: String, reason: String },
    #[error("duplicate {kind} declaration: {name}")]
    DuplicateDeclaration { kind: &'static str, name: String },
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
    #[error("connection error during {operation}: {message}{}", fmt_program_error(.program_error))]
    Connection {
        operation: String,
        message: String,
        program_error: Option<ProgramErrorCode>,
    },
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    #[error("connection is closed: {0}")]
    Closed(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid IDL: {0}")]
    InvalidIdl(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not read/write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to close {} program client(s) ({} closed): {}", .failures.len(), .closed.len(), fmt_failures(.failures))]
    Teardown {
        failures: Vec<(String, IdlClientError)>,
        closed: Vec<String>,
    },
}

impl IdlClientError {
    pub(crate) fn schema_violation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_call(instruction: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCall {
            instruction: instruction.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn connection(operation: impl Into<String>, message: impl Display) -> Self {
        Self::Connection {
            operation: operation.into(),
            message: message.to_string(),
            program_error: None,
        }
    }

    /// The custom program error code, if the failure came from the program itself.
    pub fn program_error(&self) -> Option<&ProgramErrorCode> {
        match self {
            Self::Connection { program_error, .. } => program_error.as_ref(),
            _ => None,
        }
    }
}

/// A custom error returned by an on-chain program, resolved against
/// the `errors` section of its IDL when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramErrorCode {
    pub code: u32,
    pub name: Option<String>,
    pub msg: Option<String>,
}

impl Display for ProgramErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.name, &self.msg) {
            (Some(name), Some(msg)) => write!(f, "{name} ({}): {msg}", self.code),
            (Some(name), None) => write!(f, "{name} ({})", self.code),
            _ => write!(f, "custom program error {}", self.code),
        }
    }
}

fn fmt_program_error(program_error: &Option<ProgramErrorCode>) -> String {
    program_error
        .as_ref()
        .map(|e| format!(" [{e}]"))
        .unwrap_or_default()
}

fn fmt_failures(failures: &[(String, IdlClientError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}
