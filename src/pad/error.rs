use thiserror::Error;

use super::PadKind;

/// Errors in the requested pad layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The pad identity is neither a known code nor a known name
    #[error("unknown pad type: {0}")]
    UnknownPadType(String),

    /// A custom pad was requested without its pin list
    #[error("missing pin list for {0}")]
    MissingPinList(PadKind),

    /// A custom pin list does not have one entry per slot
    #[error("invalid pin count for {kind}: expected {expected}, got {count}")]
    InvalidPinCount {
        kind: PadKind,
        expected: usize,
        count: usize,
    },

    /// A custom pin list entry is neither -1 nor a usable GPIO number
    #[error("invalid pin number {value} for {kind}")]
    InvalidPin { kind: PadKind, value: i64 },

    /// Every requested slot was empty
    #[error("no valid devices specified")]
    NoValidDevices,
}
