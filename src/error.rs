//! Error types for the Weft pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("unimplemented {opcode} on TemplateCompiler")]
    UnimplementedOpcode { opcode: String },

    #[error("stack underflow in {opcode}: expected {expected} values on the stack, found {found}")]
    StackUnderflow {
        opcode: String,
        expected: usize,
        found: usize,
    },

    #[error("malformed opcode {opcode}: {message}")]
    MalformedOpcode { opcode: String, message: String },

    #[error("malformed template: {message}")]
    MalformedTemplate { message: String },

    #[error("unresolved {kind} symbol '{name}'")]
    UnresolvedSymbol { kind: SymbolKind, name: String },

    #[error("unresolved {kind} '{path}'")]
    UnresolvedCapability { kind: CapabilityKind, path: String },

    #[error("invalid instruction state at {opcode}: {message}")]
    InvalidInstructionState { opcode: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which symbol namespace a failed lookup searched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Local,
    Named,
    Yield,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Local => write!(f, "local"),
            SymbolKind::Named => write!(f, "named"),
            SymbolKind::Yield => write!(f, "yield"),
        }
    }
}

/// Which kind of host capability a failed lookup asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Helper,
    Modifier,
    BlockHelper,
    Component,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Helper => write!(f, "helper"),
            CapabilityKind::Modifier => write!(f, "modifier"),
            CapabilityKind::BlockHelper => write!(f, "block helper"),
            CapabilityKind::Component => write!(f, "component"),
        }
    }
}

impl WeftError {
    pub fn unimplemented(opcode: impl Into<String>) -> Self {
        WeftError::UnimplementedOpcode {
            opcode: opcode.into(),
        }
    }

    pub fn underflow(opcode: impl Into<String>, expected: usize, found: usize) -> Self {
        WeftError::StackUnderflow {
            opcode: opcode.into(),
            expected,
            found,
        }
    }

    pub fn malformed_opcode(opcode: impl Into<String>, message: impl Into<String>) -> Self {
        WeftError::MalformedOpcode {
            opcode: opcode.into(),
            message: message.into(),
        }
    }

    pub fn malformed_template(message: impl Into<String>) -> Self {
        WeftError::MalformedTemplate {
            message: message.into(),
        }
    }

    pub fn unresolved_symbol(kind: SymbolKind, name: impl Into<String>) -> Self {
        WeftError::UnresolvedSymbol {
            kind,
            name: name.into(),
        }
    }

    pub fn unresolved_capability(kind: CapabilityKind, path: impl Into<String>) -> Self {
        WeftError::UnresolvedCapability {
            kind,
            path: path.into(),
        }
    }

    pub fn invalid_state(opcode: impl Into<String>, message: impl Into<String>) -> Self {
        WeftError::InvalidInstructionState {
            opcode: opcode.into(),
            message: message.into(),
        }
    }
}

/// Result type for Weft operations
pub type WeftResult<T> = Result<T, WeftError>;
