//! Merge orchestration
//!
//! Concatenates every page of N source documents, in list order, into one
//! output document, applying each file's rotation delta. Shares the
//! progress and cancellation contract of the split orchestrator.

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::engine::{DocumentEngine, LoadOptions};
use crate::error::PdfSuiteError;
use crate::job::{FileWarning, OutputEntry, Progress, SourceFile, PDF_MIME};

pub const MERGED_FILENAME: &str = "merged_output.pdf";

#[derive(Debug)]
pub struct MergeOutcome {
    pub output: OutputEntry,
    pub warnings: Vec<FileWarning>,
}

/// Merge `files` into a single document.
///
/// Fewer than two sources is a precondition failure; nothing is loaded.
/// A file that cannot be read or has no pages becomes a warning and its
/// siblings still merge. An output with zero total pages is a failure.
pub fn merge_documents<E, F>(
    engine: &E,
    files: &[SourceFile],
    load: &LoadOptions,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<MergeOutcome, PdfSuiteError>
where
    E: DocumentEngine,
    F: FnMut(&Progress),
{
    if files.len() < 2 {
        return Err(PdfSuiteError::TooFewDocuments(files.len()));
    }
    debug!(files = files.len(), "starting merge");

    let mut output = engine.new_output()?;
    let mut warnings = Vec::new();

    for (file_index, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PdfSuiteError::Cancelled);
        }

        match append_all_pages(engine, &mut output, file, load, &mut warnings) {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(file = %file.name, error = %err, "skipping file");
                warnings.push(FileWarning::new(&file.name, err.to_string()));
            }
        }

        on_progress(&Progress {
            completed: file_index + 1,
            total: files.len(),
            current_file: file.name.clone(),
        });
    }

    // Cancellation wins over the empty-output verdict.
    if cancel.is_cancelled() {
        return Err(PdfSuiteError::Cancelled);
    }
    if engine.output_page_count(&output) == 0 {
        return Err(PdfSuiteError::NoPagesMerged);
    }

    let bytes = engine.save(output)?;
    debug!(warnings = warnings.len(), size = bytes.len(), "merge finished");
    Ok(MergeOutcome {
        output: OutputEntry {
            filename: MERGED_FILENAME.to_string(),
            bytes,
            mime_type: PDF_MIME,
        },
        warnings,
    })
}

fn append_all_pages<E: DocumentEngine>(
    engine: &E,
    output: &mut E::Output,
    file: &SourceFile,
    load: &LoadOptions,
    warnings: &mut Vec<FileWarning>,
) -> Result<(), PdfSuiteError> {
    let source = engine.load(&file.bytes, load)?;
    let page_count = engine.page_count(&source);
    if page_count == 0 {
        warnings.push(FileWarning::new(&file.name, "no pages, skipped"));
        return Ok(());
    }
    let indices: Vec<u32> = (0..page_count).collect();
    engine.append_pages(output, &source, &indices, file.rotation)
}
