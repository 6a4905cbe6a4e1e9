use std::fs;
use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use log::{debug, info};
use lopdf::{Document, Object, ObjectId};
use regex::Regex;

use crate::error::{CompressError, Result};
use crate::pdf::assemble::assemble_pdf;
use crate::pdf::{EncodedPage, RasterPage};
use crate::request::MediaKind;
use crate::scratch::Scratch;
use crate::tool;

lazy_static! {
    static ref PAGE_FILE: Regex = Regex::new(r"^page-(\d+)\.png$").unwrap();
}

/// Guards the walk up a page's `Parent` chain against cyclic page trees
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Rasterizes source pages and assembles image-only documents.
pub trait PdfEngine: Send + Sync {
    /// Renders every page at `scale` times the base resolution, in page order.
    fn rasterize(&self, pdf: &[u8], scale: f32) -> Result<Vec<RasterPage>>;

    fn assemble(&self, pages: &[EncodedPage]) -> Result<Vec<u8>> {
        assemble_pdf(pages)
    }
}

/// Renders through poppler's `pdftoppm`; assembly goes through lopdf.
#[derive(Debug, Clone)]
pub struct Poppler {
    binary: PathBuf,
    base_dpi: f32,
    scratch_dir: Option<PathBuf>,
}

impl Poppler {
    pub fn new(binary: impl Into<PathBuf>, base_dpi: f32, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            base_dpi,
            scratch_dir,
        }
    }
}

impl PdfEngine for Poppler {
    fn rasterize(&self, pdf: &[u8], scale: f32) -> Result<Vec<RasterPage>> {
        let dpi = self.base_dpi * scale;
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(CompressError::InvalidResolution(dpi));
        }

        let doc = Document::load_mem(pdf).map_err(|e| CompressError::decode(MediaKind::Pdf, e))?;
        if doc.is_encrypted() {
            info!("PDF is encrypted, rendering with the empty password");
        }
        let page_sizes: Vec<Option<(f32, f32)>> = doc
            .get_pages()
            .into_values()
            .map(|page_id| page_size(&doc, page_id))
            .collect();
        let page_count = page_sizes.len();
        if page_count == 0 {
            return Err(CompressError::decode(MediaKind::Pdf, "document has no pages"));
        }

        let scratch = Scratch::new(self.scratch_dir.as_deref())?;
        let source = scratch.write("source.pdf", pdf)?;

        let mut command = Command::new(&self.binary);
        command
            .arg("-r")
            .arg(format!("{:.2}", dpi))
            .arg("-png")
            .arg(&source)
            .arg(scratch.file("page"));
        tool::run(command, "pdftoppm")?;

        let mut rendered = Vec::new();
        for entry in fs::read_dir(scratch.path())? {
            let path = entry?.path();
            let number = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(page_number);
            if let Some(number) = number {
                rendered.push((number, path));
            }
        }
        rendered.sort_by_key(|(number, _)| *number);

        if rendered.len() != page_count {
            return Err(CompressError::decode(
                MediaKind::Pdf,
                format!("rendered {} of {} pages", rendered.len(), page_count),
            ));
        }

        let mut pages = Vec::with_capacity(rendered.len());
        for ((_, path), size) in rendered.into_iter().zip(page_sizes) {
            let image = image::open(&path)
                .map_err(|e| CompressError::decode(MediaKind::Pdf, e))?
                .to_rgb8();
            let (width_pt, height_pt) = size.unwrap_or_else(|| {
                debug!("No usable MediaBox, sizing {} from its raster", path.display());
                let (width, height) = image.dimensions();
                (width as f32 * 72.0 / dpi, height as f32 * 72.0 / dpi)
            });
            pages.push(RasterPage {
                image,
                width_pt,
                height_pt,
            });
        }
        debug!("Rasterized {} pages at {:.2} DPI", pages.len(), dpi);
        scratch.close();

        Ok(pages)
    }
}

/// Displayed page size in points: the MediaBox extent, turned by `/Rotate`
/// the way the rasterizer turns the page.
fn page_size(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let media_box = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if media_box.len() != 4 {
        return None;
    }
    let mut coords = [0.0f32; 4];
    for (coord, value) in coords.iter_mut().zip(media_box) {
        *coord = doc.dereference(value).ok()?.1.as_float().ok()?;
    }
    let width = (coords[2] - coords[0]).abs();
    let height = (coords[3] - coords[1]).abs();
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return None;
    }

    let rotate = inherited(doc, page_id, b"Rotate")
        .and_then(|value| value.as_i64().ok())
        .unwrap_or(0);
    if rotate.rem_euclid(180) == 90 {
        Some((height, width))
    } else {
        Some((width, height))
    }
}

/// Page attribute lookup that follows the page tree's inheritance.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return doc.dereference(value).ok().map(|(_, object)| object);
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Page index from a `pdftoppm` output name such as `page-07.png`.
fn page_number(file_name: &str) -> Option<u32> {
    PAGE_FILE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
