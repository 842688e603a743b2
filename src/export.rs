//! Encoders for captured buffers: single PNG files and the multi-page
//! PDF produced from the batch store.
//!
//! Writes go to a `.part` sibling first and are renamed into place, so a
//! failed export never leaves a truncated document behind.

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::capture::PixelBuffer;
use crate::store::{ImageStore, StoredImage};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No images stored in temporary storage to export")]
    EmptyExportRequest,

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("PDF generation failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("File write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes `buffer` as a PNG at `path`.
pub fn save_png(buffer: &PixelBuffer, path: &Path) -> Result<(), ExportError> {
    let start = Instant::now();
    let part = part_path(path);

    let result = buffer
        .to_rgba_image()
        .save_with_format(&part, ImageFormat::Png)
        .map_err(ExportError::from)
        .and_then(|_| std::fs::rename(&part, path).map_err(ExportError::from));
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result?;

    log::info!(
        "[EXPORT] PNG {}x{} written to {} in {}ms",
        buffer.width(),
        buffer.height(),
        path.display(),
        start.elapsed().as_millis()
    );
    Ok(())
}

/// Result of a successful PDF export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub pages: usize,
}

/// Rasterizes every stored image onto its own page.
#[derive(Debug, Clone)]
pub struct DocumentExporter {
    compress: bool,
}

impl Default for DocumentExporter {
    fn default() -> Self {
        Self { compress: true }
    }
}

impl DocumentExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flate-compress page streams (on by default).
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Writes one page per stored image, in store order, each page exactly
    /// the image's size with the image at the origin. The store itself is
    /// left untouched.
    pub fn export(&self, store: &ImageStore, path: &Path) -> Result<ExportSummary, ExportError> {
        if store.is_empty() {
            log::warn!("[EXPORT] Export requested with an empty store");
            return Err(ExportError::EmptyExportRequest);
        }

        let start = Instant::now();
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::with_capacity(store.count());
        for image in store.iter() {
            let page_id = add_page(&mut doc, pages_id, image)?;
            kids.push(Object::from(page_id));
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => store.count() as i64,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if self.compress {
            doc.compress();
        }

        let part = part_path(path);
        let saved = doc
            .save(&part)
            .map_err(ExportError::from)
            .and_then(|_| std::fs::rename(&part, path).map_err(ExportError::from));
        if saved.is_err() {
            let _ = std::fs::remove_file(&part);
        }
        saved?;

        log::info!(
            "[EXPORT] PDF with {} page(s) written to {} in {}ms",
            store.count(),
            path.display(),
            start.elapsed().as_millis()
        );
        Ok(ExportSummary {
            path: path.to_path_buf(),
            pages: store.count(),
        })
    }
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image: &StoredImage,
) -> Result<ObjectId, ExportError> {
    let (w, h) = (image.width as i64, image.height as i64);

    let xobject = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w,
            "Height" => h,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
        },
        image.buffer.to_rgb_over_white(),
    );
    let image_id = doc.add_object(xobject);

    // Unit image space scaled to the full page, anchored at the origin.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let media_box: Vec<Object> = vec![0.into(), 0.into(), w.into(), h.into()];

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    });
    Ok(page_id)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
