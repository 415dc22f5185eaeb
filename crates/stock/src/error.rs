//! Stock utility errors.

use thiserror::Error;

use acctkit_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// No price list was given and selling settings name none.
    #[error("no selling price list configured")]
    MissingSellingPriceList,

    /// A spreadsheet row could not be read. `row` is 1-based and counts the header.
    #[error("row {row}: {message}")]
    Sheet { row: usize, message: String },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("stock storage error: {0}")]
    Storage(String),
}

impl From<csv::Error> for StockError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

impl From<std::io::Error> for StockError {
    fn from(e: std::io::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

pub type StockResult<T> = Result<T, StockError>;
