use thiserror::Error;

/// Errors raised while building or validating state values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A fee quote was requested without any fee fields
    #[error("fee quote has neither a priority-fee pair nor a legacy gas price")]
    MissingFeeFields,

    /// Fee arithmetic exceeded 256 bits
    #[error("fee computation overflowed")]
    FeeOverflow,

    /// Unknown enum value read from a document or contract
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors surfaced by the persistence traits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique-key violation; callers treat this as "already processed"
    #[error("duplicate key: {key}")]
    Duplicate { key: String },

    /// The addressed document does not exist
    #[error("document not found: {0}")]
    NotFound(String),

    /// Any other backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}
