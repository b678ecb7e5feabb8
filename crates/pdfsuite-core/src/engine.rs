//! Document engine seam
//!
//! Orchestrators drive documents exclusively through [`DocumentEngine`]:
//! load a source, read its page count, copy page subsets into an output
//! under construction, save. The default implementation is backed by lopdf.
//!
//! Copying works by importing the source's object graph with offset object
//! IDs (so IDs never collide), then reparenting the requested pages onto the
//! output's page tree in caller order. Unreferenced imports are pruned at
//! save time.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::PdfSuiteError;

/// Parent-chain walks are bounded; a deeper page tree than this is taken as
/// a reference cycle in a corrupt file.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Load documents that carry an /Encrypt dictionary instead of refusing
    /// them. No decryption is attempted either way.
    pub ignore_encryption: bool,
}

pub trait DocumentEngine {
    type Source;
    type Output;

    fn load(&self, bytes: &[u8], options: &LoadOptions) -> Result<Self::Source, PdfSuiteError>;

    fn page_count(&self, source: &Self::Source) -> u32;

    fn new_output(&self) -> Result<Self::Output, PdfSuiteError>;

    /// Copy the pages at `indices` (0-based, caller order preserved,
    /// repeats across calls legal) into `output`, setting each copied
    /// page's rotation to its intrinsic rotation plus `rotate_by` degrees,
    /// modulo 360.
    fn append_pages(
        &self,
        output: &mut Self::Output,
        source: &Self::Source,
        indices: &[u32],
        rotate_by: i32,
    ) -> Result<(), PdfSuiteError>;

    fn output_page_count(&self, output: &Self::Output) -> u32;

    fn save(&self, output: Self::Output) -> Result<Vec<u8>, PdfSuiteError>;
}

/// lopdf-backed document engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEngine;

pub struct LoadedPdf {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl DocumentEngine for LopdfEngine {
    type Source = LoadedPdf;
    type Output = PdfBuilder;

    fn load(&self, bytes: &[u8], options: &LoadOptions) -> Result<LoadedPdf, PdfSuiteError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| PdfSuiteError::Parse(e.to_string()))?;
        check_encryption(&doc, options)?;
        let page_ids = doc.get_pages().values().copied().collect();
        Ok(LoadedPdf { doc, page_ids })
    }

    fn page_count(&self, source: &LoadedPdf) -> u32 {
        source.page_ids.len() as u32
    }

    fn new_output(&self) -> Result<PdfBuilder, PdfSuiteError> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(0)),
                ("Kids", Object::Array(Vec::new())),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        Ok(PdfBuilder {
            doc,
            pages_id,
            kids: Vec::new(),
        })
    }

    fn append_pages(
        &self,
        output: &mut PdfBuilder,
        source: &LoadedPdf,
        indices: &[u32],
        rotate_by: i32,
    ) -> Result<(), PdfSuiteError> {
        if indices.is_empty() {
            return Ok(());
        }

        // Import the whole source graph with shifted IDs; anything the
        // selected pages don't reach is pruned at save time.
        let offset = output.doc.max_id;
        for (old_id, object) in &source.doc.objects {
            let mut object = object.clone();
            shift_refs(&mut object, offset);
            output
                .doc
                .objects
                .insert((old_id.0 + offset, old_id.1), object);
        }
        output.doc.max_id = output.doc.max_id.max(source.doc.max_id + offset);

        for &index in indices {
            let src_page = *source.page_ids.get(index as usize).ok_or_else(|| {
                PdfSuiteError::Operation(format!(
                    "page index {} out of bounds, document has {} pages",
                    index,
                    source.page_ids.len()
                ))
            })?;

            // Inheritable attributes must be pinned onto the page before
            // reparenting severs its chain to the source page tree.
            let intrinsic = inherited_rotation(&source.doc, src_page);
            let resources = missing_inheritable(&source.doc, src_page, b"Resources", offset);
            let media_box = missing_inheritable(&source.doc, src_page, b"MediaBox", offset);

            let new_id = (src_page.0 + offset, src_page.1);
            let Some(Object::Dictionary(page)) = output.doc.objects.get_mut(&new_id) else {
                return Err(PdfSuiteError::Operation(format!(
                    "page object {} {} is not a dictionary",
                    new_id.0, new_id.1
                )));
            };
            page.set("Parent", Object::Reference(output.pages_id));
            page.set(
                "Rotate",
                Object::Integer(compose_rotation(intrinsic, rotate_by) as i64),
            );
            if let Some(resources) = resources {
                page.set("Resources", resources);
            }
            if let Some(media_box) = media_box {
                page.set("MediaBox", media_box);
            }

            output.kids.push(new_id);
        }
        Ok(())
    }

    fn output_page_count(&self, output: &PdfBuilder) -> u32 {
        output.kids.len() as u32
    }

    fn save(&self, mut output: PdfBuilder) -> Result<Vec<u8>, PdfSuiteError> {
        let kids: Vec<Object> = output
            .kids
            .iter()
            .map(|&id| Object::Reference(id))
            .collect();
        let count = output.kids.len() as i64;

        let Some(Object::Dictionary(pages)) = output.doc.objects.get_mut(&output.pages_id)
        else {
            return Err(PdfSuiteError::Operation(
                "output page tree is not a dictionary".into(),
            ));
        };
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", Object::Integer(count));

        output.doc.prune_objects();
        output.doc.compress();

        let mut buffer = Vec::new();
        output
            .doc
            .save_to(&mut buffer)
            .map_err(|e| PdfSuiteError::Operation(format!("save failed: {}", e)))?;
        Ok(buffer)
    }
}

fn check_encryption(doc: &Document, options: &LoadOptions) -> Result<(), PdfSuiteError> {
    if doc.trailer.get(b"Encrypt").is_ok() && !options.ignore_encryption {
        return Err(PdfSuiteError::Parse("document is encrypted".into()));
    }
    Ok(())
}

/// Rotation composition rule: the user delta never overwrites a page's
/// pre-existing rotation, it is added to it.
pub fn compose_rotation(intrinsic: i32, delta: i32) -> i32 {
    (intrinsic + delta).rem_euclid(360)
}

/// Recursively shift every indirect reference in `object` by `offset`.
fn shift_refs(object: &mut Object, offset: u32) {
    match object {
        Object::Reference(id) => id.0 += offset,
        Object::Array(items) => {
            for item in items.iter_mut() {
                shift_refs(item, offset);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                shift_refs(value, offset);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                shift_refs(value, offset);
            }
        }
        _ => {}
    }
}

/// A page's effective /Rotate, following the inheritance chain.
fn inherited_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let Ok(dict) = doc.get_object(current).and_then(|o| o.as_dict()) else {
            return 0;
        };
        if let Ok(rotate) = dict.get(b"Rotate").and_then(Object::as_i64) {
            return (rotate as i32).rem_euclid(360);
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return 0,
        }
    }
    0
}

/// If the page itself lacks `key` but inherits it from an ancestor, return
/// the inherited value with its references shifted for the import.
fn missing_inheritable(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
    offset: u32,
) -> Option<Object> {
    let page = doc.get_object(page_id).and_then(|o| o.as_dict()).ok()?;
    if page.has(key) {
        return None;
    }
    let mut current = page;
    for _ in 0..MAX_TREE_DEPTH {
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = current.get(key) {
            let mut value = value.clone();
            shift_refs(&mut value, offset);
            return Some(value);
        }
    }
    None
}
