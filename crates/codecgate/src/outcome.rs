//! Result of one `parse_codec` call, and its wire shape.

use codecgate_params::CodecDescription;
use serde::Serialize;

use crate::error::CodecError;

/// Success XOR error, never both.
pub type ParseOutcome = Result<CodecDescription, CodecError>;

/// `{"error": "", "data": {...}}` on success,
/// `{"error": "<reason>", "data": null}` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub error: String,
    pub data: Option<CodecDescription>,
}

impl OutcomeRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

impl From<&ParseOutcome> for OutcomeRecord {
    fn from(outcome: &ParseOutcome) -> Self {
        match outcome {
            Ok(desc) => Self {
                error: String::new(),
                data: Some(desc.clone()),
            },
            Err(e) => Self {
                error: e.to_string(),
                data: None,
            },
        }
    }
}

impl From<ParseOutcome> for OutcomeRecord {
    fn from(outcome: ParseOutcome) -> Self {
        match outcome {
            Ok(desc) => Self {
                error: String::new(),
                data: Some(desc),
            },
            Err(e) => Self {
                error: e.to_string(),
                data: None,
            },
        }
    }
}
