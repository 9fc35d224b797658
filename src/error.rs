use thiserror::Error;

use crate::parse::ParseError;

pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Failures outside the validator's diagnostics: bad catalog data, bad
/// options, or a grammar failure.
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("Invalid function catalog: {0}")]
    Catalog(String),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decimal places must be between 0 and {max}, got {actual}")]
    DecimalPlaces { max: u8, actual: u8 },

    #[error("Invalid literal: {0}")]
    Literal(String),

    #[error("Parse error: {0}")]
    Parse(#[from] Box<ParseError>),
}

impl From<ParseError> for FormulaError {
    fn from(error: ParseError) -> Self {
        Self::Parse(Box::new(error))
    }
}
