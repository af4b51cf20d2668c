use thiserror::Error;

/// Why a set of parameter units could not be turned into a codec description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{unit} truncated: need at least {needed} bytes, got {actual}")]
    Truncated {
        unit: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("{unit} ended while reading {field}")]
    Exhausted {
        unit: &'static str,
        field: &'static str,
    },
    #[error("{unit} has forbidden_zero_bit set")]
    ForbiddenBit { unit: &'static str },
    #[error("{unit} has NAL unit type {found}, expected {expected}")]
    UnexpectedNalType {
        unit: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("{unit} field {field} out of range: {value}")]
    OutOfRange {
        unit: &'static str,
        field: &'static str,
        value: u64,
    },
    #[error("unsupported {codec} profile_idc {profile_idc}")]
    UnsupportedProfile {
        codec: &'static str,
        profile_idc: u8,
    },
    #[error("{unit} references parameter set id {referenced}, but the supplied one has id {found}")]
    IdMismatch {
        unit: &'static str,
        referenced: u32,
        found: u32,
    },
    #[error("{unit} is {len} bytes, too large for a decoder configuration record")]
    TooLarge { unit: &'static str, len: usize },
    #[error("stream contains no {unit}")]
    Missing { unit: &'static str },
}

impl ParseError {
    /// Human-readable reason, never empty.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
