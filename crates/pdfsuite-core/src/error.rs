use pdfsuite_archive::ArchiveError;
use thiserror::Error;

use crate::ranges::RangeError;

#[derive(Error, Debug)]
pub enum PdfSuiteError {
    #[error("invalid page range: {0}")]
    Range(#[from] RangeError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("no outputs were generated")]
    NoOutputsGenerated,

    #[error("merged document has no pages")]
    NoPagesMerged,

    #[error("merge requires at least 2 documents, got {0}")]
    TooFewDocuments(usize),

    #[error("operation cancelled")]
    Cancelled,
}

impl PdfSuiteError {
    /// Cancellation is a control signal, not a processing failure; callers
    /// use this to avoid surfacing it as an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PdfSuiteError::Cancelled)
    }
}
