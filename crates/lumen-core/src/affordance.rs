//! Code block affordances: copy and preview.
//!
//! The copy button is a two-state label (`Copy` → `Copied!`) that reverts on
//! its own after a short delay. Time is passed in explicitly so the state
//! machine stays deterministic.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::{CodeConfig, Labels};
use crate::render::{CodeBlock, RenderedMessage};

/// Error types for code block actions.
#[derive(Debug, thiserror::Error)]
pub enum AffordanceError {
    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("Failed to write preview file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open preview: {0}")]
    Open(String),

    #[error("No code block at index {0}")]
    NoSuchBlock(usize),

    #[error("Code block {0} cannot be previewed")]
    NotPreviewable(usize),
}

/// Two-state copy label.
#[derive(Debug, Clone)]
pub struct CopyAffordance {
    idle_label: String,
    copied_label: String,
    revert_after: Duration,
    copied_at: Option<Instant>,
}

impl CopyAffordance {
    pub fn new(labels: &Labels, code: &CodeConfig) -> Self {
        Self {
            idle_label: labels.copy.clone(),
            copied_label: labels.copied.clone(),
            revert_after: code.copy_revert(),
            copied_at: None,
        }
    }

    /// Switches to the "copied" label. Activating again restarts the timer.
    pub fn activate(&mut self, now: Instant) {
        self.copied_at = Some(now);
    }

    pub fn is_copied(&self, now: Instant) -> bool {
        self.copied_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.revert_after)
    }

    pub fn label(&self, now: Instant) -> &str {
        if self.is_copied(now) {
            &self.copied_label
        } else {
            &self.idle_label
        }
    }

    /// Drops the expired "copied" state. Returns true if the label changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.copied_at.is_some() && !self.is_copied(now) {
            self.copied_at = None;
            return true;
        }
        false
    }
}

/// Destination for copied code.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<(), AffordanceError>;
}

/// Opens a markup document somewhere isolated from the transcript.
pub trait PreviewSink {
    fn open(&mut self, html: &str) -> Result<(), AffordanceError>;
}

/// The system clipboard through arboard.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), AffordanceError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| AffordanceError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| AffordanceError::Clipboard(e.to_string()))
    }
}

/// Writes the document to a temp `.html` file and opens it in the browser.
#[derive(Debug, Default)]
pub struct BrowserPreview {
    opened: Vec<PathBuf>,
}

impl BrowserPreview {
    /// Files written so far. They outlive the process so the browser can
    /// still read them.
    pub fn opened(&self) -> &[PathBuf] {
        &self.opened
    }

    fn write(html: &str) -> Result<PathBuf, AffordanceError> {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .prefix("lumen-preview-")
            .suffix(".html")
            .tempfile()?;
        file.write_all(html.as_bytes())?;
        let (_, path) = file.keep().map_err(|e| AffordanceError::Io(e.error))?;
        Ok(path)
    }
}

impl PreviewSink for BrowserPreview {
    fn open(&mut self, html: &str) -> Result<(), AffordanceError> {
        let path = Self::write(html)?;
        tracing::info!(path = %path.display(), "opening preview");
        open::that(&path).map_err(|e| AffordanceError::Open(e.to_string()))?;
        self.opened.push(path);
        Ok(())
    }
}

fn code_block(message: &RenderedMessage, index: usize) -> Result<&CodeBlock, AffordanceError> {
    message
        .code_blocks()
        .get(index)
        .ok_or(AffordanceError::NoSuchBlock(index))
}

/// Copies the literal text of code block `index`.
pub fn copy_code_block(
    message: &RenderedMessage,
    index: usize,
    clipboard: &mut dyn Clipboard,
) -> Result<(), AffordanceError> {
    let block = code_block(message, index)?;
    clipboard.set_text(&block.text)
}

/// Opens code block `index` in the preview sink. Only markup blocks qualify.
pub fn preview_code_block(
    message: &RenderedMessage,
    index: usize,
    sink: &mut dyn PreviewSink,
) -> Result<(), AffordanceError> {
    let block = code_block(message, index)?;
    if !block.previewable {
        return Err(AffordanceError::NotPreviewable(index));
    }
    sink.open(&block.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ContentRenderer;

    #[derive(Default)]
    struct MemoryClipboard(Vec<String>);

    impl Clipboard for MemoryClipboard {
        fn set_text(&mut self, text: &str) -> Result<(), AffordanceError> {
            self.0.push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryPreview(Vec<String>);

    impl PreviewSink for MemoryPreview {
        fn open(&mut self, html: &str) -> Result<(), AffordanceError> {
            self.0.push(html.to_string());
            Ok(())
        }
    }

    fn affordance() -> CopyAffordance {
        CopyAffordance::new(&Labels::default(), &CodeConfig::default())
    }

    #[test]
    fn test_copy_label_reverts_after_delay() {
        let mut copy = affordance();
        let start = Instant::now();
        assert_eq!(copy.label(start), "Copy");

        copy.activate(start);
        assert_eq!(copy.label(start + Duration::from_millis(1999)), "Copied!");
        assert_eq!(copy.label(start + Duration::from_millis(2000)), "Copy");
    }

    #[test]
    fn test_tick_reports_revert_once() {
        let mut copy = affordance();
        let start = Instant::now();
        copy.activate(start);
        assert!(!copy.tick(start + Duration::from_millis(500)));
        assert!(copy.tick(start + Duration::from_secs(3)));
        assert!(!copy.tick(start + Duration::from_secs(4)));
    }

    #[test]
    fn test_reactivate_restarts_timer() {
        let mut copy = affordance();
        let start = Instant::now();
        copy.activate(start);
        copy.activate(start + Duration::from_millis(1500));
        assert!(copy.is_copied(start + Duration::from_millis(3000)));
    }

    #[test]
    fn test_copy_code_block_text() {
        let message = ContentRenderer::default().render("```rust\nfn main() {}\n```\n");
        let mut clipboard = MemoryClipboard::default();
        copy_code_block(&message, 0, &mut clipboard).unwrap();
        assert_eq!(clipboard.0, ["fn main() {}\n"]);

        assert!(matches!(
            copy_code_block(&message, 3, &mut clipboard),
            Err(AffordanceError::NoSuchBlock(3))
        ));
    }

    #[test]
    fn test_preview_only_markup() {
        let message = ContentRenderer::default()
            .render("```html\n<h1>Hi</h1>\n```\n\n```rust\nlet x = 1;\n```\n");
        let mut sink = MemoryPreview::default();

        preview_code_block(&message, 0, &mut sink).unwrap();
        assert_eq!(sink.0, ["<h1>Hi</h1>\n"]);
        assert!(matches!(
            preview_code_block(&message, 1, &mut sink),
            Err(AffordanceError::NotPreviewable(1))
        ));
    }

    #[test]
    fn test_browser_preview_writes_file() {
        let path = BrowserPreview::write("<p>hi</p>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>hi</p>");
        assert_eq!(path.extension().unwrap(), "html");
        std::fs::remove_file(path).unwrap();
    }
}
