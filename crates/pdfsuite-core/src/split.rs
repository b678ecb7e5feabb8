//! Split orchestration
//!
//! Turns a batch of source documents plus a [`SplitPlan`] into a
//! deterministic list of output buffers. Each file is processed to
//! completion before the next begins; the plan is re-validated against
//! every file's own page count. Malformed plans and broken files degrade to
//! per-file warnings so one bad input never sinks its siblings; only
//! cancellation and a fully empty result abort the run.

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::engine::{DocumentEngine, LoadOptions};
use crate::error::PdfSuiteError;
use crate::job::{FileWarning, OutputEntry, Progress, SourceFile, SplitPlan, PDF_MIME};
use crate::ranges::{expand_page_indices, fixed_page_groups, parse_page_ranges};

/// Filename of the single merged result when the plan merges outputs.
pub const MERGED_SPLIT_FILENAME: &str = "split_output.pdf";

#[derive(Debug)]
pub struct SplitOutcome {
    pub outputs: Vec<OutputEntry>,
    pub warnings: Vec<FileWarning>,
}

/// Execute `plan` against `files`, reporting progress after every file.
///
/// Cancellation is cooperative: the token is checked at the top of each
/// file and before each materialization, and a tripped token returns
/// `Err(Cancelled)` with no partial outputs.
pub fn split_documents<E, F>(
    engine: &E,
    files: &[SourceFile],
    plan: &SplitPlan,
    load: &LoadOptions,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<SplitOutcome, PdfSuiteError>
where
    E: DocumentEngine,
    F: FnMut(&Progress),
{
    debug!(files = files.len(), merge = plan.merge_outputs(), "starting split");

    let mut outputs = Vec::new();
    let mut warnings = Vec::new();
    let mut merged = if plan.merge_outputs() {
        Some(engine.new_output()?)
    } else {
        None
    };

    for (file_index, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PdfSuiteError::Cancelled);
        }

        let prefix = output_prefix(file_index, files.len(), &file.name);
        let result = process_file(
            engine,
            file,
            plan,
            &prefix,
            load,
            cancel,
            merged.as_mut(),
            &mut outputs,
            &mut warnings,
        );
        match result {
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

    if let Some(merged) = merged {
        // A merged document nothing was appended to is not an output.
        if engine.output_page_count(&merged) > 0 {
            if cancel.is_cancelled() {
                return Err(PdfSuiteError::Cancelled);
            }
            let bytes = engine.save(merged)?;
            outputs.push(OutputEntry {
                filename: MERGED_SPLIT_FILENAME.to_string(),
                bytes,
                mime_type: PDF_MIME,
            });
        }
    }

    if outputs.is_empty() {
        return Err(PdfSuiteError::NoOutputsGenerated);
    }
    debug!(outputs = outputs.len(), warnings = warnings.len(), "split finished");
    Ok(SplitOutcome { outputs, warnings })
}

#[allow(clippy::too_many_arguments)]
fn process_file<E: DocumentEngine>(
    engine: &E,
    file: &SourceFile,
    plan: &SplitPlan,
    prefix: &str,
    load: &LoadOptions,
    cancel: &CancelToken,
    mut merged: Option<&mut E::Output>,
    outputs: &mut Vec<OutputEntry>,
    warnings: &mut Vec<FileWarning>,
) -> Result<(), PdfSuiteError> {
    let source = engine.load(&file.bytes, load)?;
    let page_count = engine.page_count(&source);
    if page_count == 0 {
        warnings.push(FileWarning::new(&file.name, "no pages, skipped"));
        return Ok(());
    }

    // One (filename, page indices) group per pending output. Range mode
    // keeps overlapping ranges as separate groups; extract-selected is the
    // only mode that de-duplicates.
    let groups: Vec<(String, Vec<u32>)> = match plan {
        SplitPlan::Range { ranges, .. } => {
            let parsed = match parse_page_ranges(ranges, page_count) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warnings.push(FileWarning::new(&file.name, err.to_string()));
                    return Ok(());
                }
            };
            parsed
                .iter()
                .map(|range| {
                    (
                        format!("{}_pages_{}-{}.pdf", prefix, range.start, range.end),
                        expand_page_indices(std::slice::from_ref(range), false),
                    )
                })
                .collect()
        }
        SplitPlan::Fixed { chunk_size, .. } => {
            let chunks = fixed_page_groups(page_count, *chunk_size);
            if chunks.is_empty() {
                warnings.push(FileWarning::new(
                    &file.name,
                    format!("invalid chunk size {}", chunk_size),
                ));
                return Ok(());
            }
            chunks
                .into_iter()
                .enumerate()
                .map(|(i, group)| (format!("{}_part_{}.pdf", prefix, i + 1), group))
                .collect()
        }
        SplitPlan::ExtractAll { .. } => (0..page_count)
            .map(|page| (format!("{}_page_{}.pdf", prefix, page + 1), vec![page]))
            .collect(),
        SplitPlan::ExtractSelected { pages, .. } => {
            let parsed = match parse_page_ranges(pages, page_count) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warnings.push(FileWarning::new(&file.name, err.to_string()));
                    return Ok(());
                }
            };
            let indices = expand_page_indices(&parsed, true);
            if indices.is_empty() {
                warnings.push(FileWarning::new(&file.name, "selection is empty"));
                return Ok(());
            }
            if merged.is_some() {
                // When merging, the whole selection is one append run.
                vec![(String::new(), indices)]
            } else {
                indices
                    .into_iter()
                    .map(|page| (format!("{}_page_{}.pdf", prefix, page + 1), vec![page]))
                    .collect()
            }
        }
    };

    for (filename, indices) in groups {
        if cancel.is_cancelled() {
            return Err(PdfSuiteError::Cancelled);
        }
        if let Some(target) = merged.as_mut() {
            engine.append_pages(target, &source, &indices, file.rotation)?;
        } else {
            let mut output = engine.new_output()?;
            engine.append_pages(&mut output, &source, &indices, file.rotation)?;
            let bytes = engine.save(output)?;
            outputs.push(OutputEntry {
                filename,
                bytes,
                mime_type: PDF_MIME,
            });
        }
    }
    Ok(())
}

/// Base name for a file's outputs: original name minus a trailing `.pdf`
/// (ASCII case-insensitive), falling back to `"document"`.
fn output_stem(name: &str) -> String {
    let name = name.trim();
    let stem = if name.len() >= 4
        && name.is_char_boundary(name.len() - 4)
        && name[name.len() - 4..].eq_ignore_ascii_case(".pdf")
    {
        &name[..name.len() - 4]
    } else {
        name
    };
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

fn output_prefix(file_index: usize, total_files: usize, name: &str) -> String {
    let stem = output_stem(name);
    if total_files > 1 {
        format!("{}_{}", file_index + 1, stem)
    } else {
        stem
    }
}
