use codecgate_params::ParseError;
use thiserror::Error;

/// The module could not be brought up. Terminal for the gate that saw it, and
/// handed to every caller of that gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("module not loaded: {reason}")]
pub struct ModuleLoadError {
    pub reason: String,
}

impl ModuleLoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure of a single `parse_codec` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),
    /// The module ran but produced no value.
    #[error("empty result")]
    EmptyResult,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CodecError {
    /// True for errors that every call on the same gate will also see.
    pub fn is_gate_wide(&self) -> bool {
        matches!(self, CodecError::ModuleLoad(_))
    }
}
