//! Screenshot commands: capture to a PNG file, or collect captures in the
//! batch store and export them together as one PDF.
//!
//! Independent of the recording session; any of these may run while a
//! recording is in progress.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::capture::{CaptureError, CaptureTarget, Capturer, PixelBuffer};
use crate::export::{save_png, DocumentExporter, ExportError, ExportSummary};
use crate::geometry::Rect;
use crate::output::{resolve_output_dir, timestamped_name, OutputKind};
use crate::selector::{select_region, SelectionSurface};
use crate::settings::SettingsProvider;
use crate::store::ImageStore;

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("File system failure: {0}")]
    FileSystem(#[from] std::io::Error),
}

pub struct ScreenshotService {
    capturer: Capturer,
    settings: Arc<dyn SettingsProvider>,
    default_picture_dir: PathBuf,
    store: ImageStore,
    exporter: DocumentExporter,
}

impl ScreenshotService {
    pub fn new(
        capturer: Capturer,
        settings: Arc<dyn SettingsProvider>,
        default_picture_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            capturer,
            settings,
            default_picture_dir: default_picture_dir.into(),
            store: ImageStore::new(),
            exporter: DocumentExporter::new(),
        }
    }

    pub fn with_exporter(mut self, exporter: DocumentExporter) -> Self {
        self.exporter = exporter;
        self
    }

    /// Full primary screen to `Capture_*.png`.
    pub fn capture_to_file(&self) -> Result<PathBuf, ScreenshotError> {
        let buffer = self.capturer.capture(CaptureTarget::FullScreen)?;
        self.write_png(&buffer, OutputKind::Screenshot)
    }

    /// `rect` (virtual-screen coordinates) to `CaptureP_*.png`.
    pub fn capture_region_to_file(&self, rect: Rect) -> Result<PathBuf, ScreenshotError> {
        let buffer = self.capturer.capture(CaptureTarget::Region(rect))?;
        self.write_png(&buffer, OutputKind::RegionScreenshot)
    }

    /// Lets the user pick a rectangle on `surface`, then saves it like
    /// `capture_region_to_file`. `None` when the selection was cancelled.
    pub fn select_region_to_file(
        &self,
        surface: &mut dyn SelectionSurface,
    ) -> Result<Option<PathBuf>, ScreenshotError> {
        match self.select(surface)? {
            Some(rect) => self.capture_region_to_file(rect).map(Some),
            None => Ok(None),
        }
    }

    /// Full screen into the batch. Returns the new batch size.
    pub fn capture_to_batch(&mut self) -> Result<usize, ScreenshotError> {
        let buffer = self.capturer.capture(CaptureTarget::FullScreen)?;
        Ok(self.store.append(buffer))
    }

    pub fn capture_region_to_batch(&mut self, rect: Rect) -> Result<usize, ScreenshotError> {
        let buffer = self.capturer.capture(CaptureTarget::Region(rect))?;
        Ok(self.store.append(buffer))
    }

    pub fn select_region_to_batch(
        &mut self,
        surface: &mut dyn SelectionSurface,
    ) -> Result<Option<usize>, ScreenshotError> {
        match self.select(surface)? {
            Some(rect) => self.capture_region_to_batch(rect).map(Some),
            None => Ok(None),
        }
    }

    /// Writes the batch to `Screenshots_*.pdf`. The batch is kept; call
    /// `clear_batch` once the document is no longer needed.
    pub fn export_batch(&self) -> Result<ExportSummary, ScreenshotError> {
        let name = timestamped_name(OutputKind::BatchDocument, Local::now());
        let path = self.picture_dir()?.join(name);
        Ok(self.exporter.export(&self.store, &path)?)
    }

    pub fn clear_batch(&mut self) {
        self.store.clear();
        log::info!("[CAPTURE] Batch cleared");
    }

    pub fn batch_count(&self) -> usize {
        self.store.count()
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn capturer(&self) -> &Capturer {
        &self.capturer
    }

    /// The overlay spans every monitor, as reported by the capture backend.
    fn select(&self, surface: &mut dyn SelectionSurface) -> Result<Option<Rect>, ScreenshotError> {
        let bounds = self.capturer.virtual_bounds()?;
        Ok(select_region(surface, bounds))
    }

    fn picture_dir(&self) -> Result<PathBuf, ScreenshotError> {
        let dir = resolve_output_dir(&self.settings.picture_dir(), &self.default_picture_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn write_png(&self, buffer: &PixelBuffer, kind: OutputKind) -> Result<PathBuf, ScreenshotError> {
        let path = self.picture_dir()?.join(timestamped_name(kind, Local::now()));
        save_png(buffer, &path)?;
        Ok(path)
    }
}
