//! Shared job value types
//!
//! The plan, source and output types exchanged between the UI layer and the
//! orchestrators. Plans are plain serde values describing intent; they are
//! re-validated against each source file's page count at execution time
//! because files in one batch may have differing lengths.

use serde::{Deserialize, Serialize};

pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";

/// A loaded source document plus the user-applied rotation delta.
///
/// `rotation` is degrees in {0, 90, 180, 270}, composed with each page's
/// intrinsic rotation when pages are materialized, never overwriting it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub rotation: i32,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            rotation: 0,
            bytes,
        }
    }

    pub fn with_rotation(mut self, degrees: i32) -> Self {
        self.rotation = degrees;
        self
    }
}

/// One fully materialized output document or archive.
///
/// Created exactly once; ownership moves to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// How a batch of source documents should be split.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SplitPlan {
    /// Materialize one output per parsed range (overlap legal), or append
    /// each range to the shared merged output.
    Range { ranges: String, merge_outputs: bool },
    /// Contiguous chunks of `chunk_size` pages; the last may be short.
    Fixed { chunk_size: u32, merge_outputs: bool },
    /// One output per page.
    ExtractAll { merge_outputs: bool },
    /// De-duplicated page selection; one output per selected page, or the
    /// whole selection appended as a single run when merging.
    ExtractSelected { pages: String, merge_outputs: bool },
}

impl SplitPlan {
    pub fn merge_outputs(&self) -> bool {
        match *self {
            SplitPlan::Range { merge_outputs, .. }
            | SplitPlan::Fixed { merge_outputs, .. }
            | SplitPlan::ExtractAll { merge_outputs }
            | SplitPlan::ExtractSelected { merge_outputs, .. } => merge_outputs,
        }
    }
}

/// A recoverable per-file problem, reported beside successful output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub file: String,
    pub message: String,
}

impl FileWarning {
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Progress snapshot, reported once per source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current_file: String,
}
