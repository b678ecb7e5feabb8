//! PDF output assembly and orchestration
//!
//! The engine room of a browser-based PDF toolkit: page-range algebra,
//! split and merge orchestration with progress reporting and cooperative
//! cancellation, a serialized preview rendering queue, and packaging of
//! results into an uncompressed ZIP archive.
//!
//! Documents themselves are driven through the [`engine::DocumentEngine`]
//! seam; [`engine::LopdfEngine`] is the default lopdf-backed
//! implementation. Rendering previews is likewise delegated to a
//! [`preview::PageRenderer`] supplied by the caller.

pub mod cancel;
pub mod engine;
pub mod error;
pub mod job;
pub mod merge;
pub mod preview;
pub mod ranges;
pub mod split;

pub use cancel::CancelToken;
pub use engine::{DocumentEngine, LoadOptions, LopdfEngine};
pub use error::PdfSuiteError;
pub use job::{FileWarning, OutputEntry, Progress, SourceFile, SplitPlan, PDF_MIME, ZIP_MIME};
pub use merge::{merge_documents, MergeOutcome};
pub use preview::{PageRenderer, PreviewQueue};
pub use ranges::{expand_page_indices, fixed_page_groups, parse_page_ranges, PageRange};
pub use split::{split_documents, SplitOutcome};

use pdfsuite_archive::{write_zip, ZipEntry};

/// Package a list of outputs into a single ZIP download.
///
/// Entry names inside the archive match the output filenames exactly.
pub fn zip_outputs(
    outputs: &[OutputEntry],
    archive_name: impl Into<String>,
) -> Result<OutputEntry, PdfSuiteError> {
    let entries: Vec<ZipEntry> = outputs
        .iter()
        .map(|output| ZipEntry::new(output.filename.clone(), output.bytes.clone()))
        .collect();
    let bytes = write_zip(&entries)?;
    Ok(OutputEntry {
        filename: archive_name.into(),
        bytes,
        mime_type: ZIP_MIME,
    })
}
