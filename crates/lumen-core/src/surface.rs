//! Retained display surfaces.
//!
//! A [`Transcript`] is an ordered list of [`Surface`]s: the chat message list
//! or the results area of a run. Stream accumulators write into surfaces by
//! id; each surface records which accumulator currently owns it, so a late
//! chunk from a retired accumulator can be told apart from a live one.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::markdown::escape_html;
use crate::render::RenderedMessage;

static SURFACE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
static ACCUMULATOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a surface.
///
/// IDs are monotonically increasing and unique within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    pub fn new() -> Self {
        SurfaceId(SURFACE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a stream accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccumulatorId(pub u64);

impl AccumulatorId {
    pub fn new() -> Self {
        AccumulatorId(ACCUMULATOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AccumulatorId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a surface is for. Drives its CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    User,
    Assistant,
    /// Container message of a workflow run in the chat.
    Workflow,
    Step,
    /// Spinner with a message while the final report is produced.
    Loader,
    Report,
    Error,
}

impl SurfaceKind {
    fn css_class(self) -> &'static str {
        match self {
            SurfaceKind::User => "user",
            SurfaceKind::Assistant => "assistant",
            SurfaceKind::Workflow => "workflow",
            SurfaceKind::Step => "workflow-step",
            SurfaceKind::Loader => "loader",
            SurfaceKind::Report => "final-report",
            SurfaceKind::Error => "error",
        }
    }
}

/// What a surface currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SurfaceContent {
    #[default]
    Empty,
    /// Waiting for the first chunk.
    Pending,
    /// Accumulated text so far, shown verbatim.
    Streaming(String),
    Rendered(RenderedMessage),
    /// Plain text (user input, loader message).
    Text(String),
    Error(String),
}

impl SurfaceContent {
    pub fn to_html(&self) -> String {
        match self {
            SurfaceContent::Empty => String::new(),
            SurfaceContent::Pending => "<span class=\"thinking-indicator\"></span>".to_string(),
            SurfaceContent::Streaming(text) => {
                format!("<div class=\"streaming-text\">{}</div>", escape_html(text))
            }
            SurfaceContent::Rendered(message) => message.to_html(),
            SurfaceContent::Text(text) => escape_html(text),
            SurfaceContent::Error(text) => {
                format!("<div class=\"error-message\">{}</div>", escape_html(text))
            }
        }
    }
}

/// One visible region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    pub header: Option<String>,
    pub content: SurfaceContent,
    pub visible: bool,
    binding: Option<AccumulatorId>,
}

impl Surface {
    pub fn new(kind: SurfaceKind, content: SurfaceContent) -> Self {
        Self {
            id: SurfaceId::new(),
            kind,
            header: None,
            content,
            visible: true,
            binding: None,
        }
    }

    /// The accumulator currently allowed to write here.
    pub fn binding(&self) -> Option<AccumulatorId> {
        self.binding
    }

    pub fn to_html(&self) -> String {
        let mut out = format!(
            "<div class=\"surface {}\" data-surface-id=\"{}\">",
            self.kind.css_class(),
            self.id.0
        );
        if let Some(header) = &self.header {
            let _ = write!(
                out,
                "<div class=\"surface-header\">{}</div>",
                escape_html(header)
            );
        }
        out.push_str(&self.content.to_html());
        out.push_str("</div>");
        out
    }
}

/// Ordered list of surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    surfaces: Vec<Surface>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a surface and returns its id.
    pub fn push(&mut self, kind: SurfaceKind, content: SurfaceContent) -> SurfaceId {
        self.push_surface(Surface::new(kind, content))
    }

    pub fn push_surface(&mut self, surface: Surface) -> SurfaceId {
        let id = surface.id;
        self.surfaces.push(surface);
        id
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.iter_mut().find(|s| s.id == id)
    }

    pub fn remove(&mut self, id: SurfaceId) -> Option<Surface> {
        let pos = self.surfaces.iter().position(|s| s.id == id)?;
        Some(self.surfaces.remove(pos))
    }

    /// Drops every surface. Accumulators bound to them become retired.
    pub fn clear(&mut self) {
        self.surfaces.clear();
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Surface> {
        self.surfaces.iter()
    }

    pub fn last(&self) -> Option<&Surface> {
        self.surfaces.last()
    }

    /// Binds `accumulator` to a surface, retiring whichever accumulator was
    /// bound before. Returns the retired one.
    ///
    /// Returns `None` without binding anything if the surface does not exist.
    pub fn bind(
        &mut self,
        surface: SurfaceId,
        accumulator: AccumulatorId,
    ) -> Option<AccumulatorId> {
        let target = self.get_mut(surface)?;
        let previous = target.binding.replace(accumulator);
        if let Some(previous) = previous
            && previous != accumulator
        {
            tracing::debug!(
                surface = surface.0,
                retired = previous.0,
                "accumulator retired by rebind"
            );
        }
        previous.filter(|p| *p != accumulator)
    }

    /// Releases the binding if `accumulator` still owns the surface.
    pub fn unbind(&mut self, surface: SurfaceId, accumulator: AccumulatorId) {
        if let Some(target) = self.get_mut(surface)
            && target.binding == Some(accumulator)
        {
            target.binding = None;
        }
    }

    /// True if the surface exists and `accumulator` owns it.
    pub fn is_bound(&self, surface: SurfaceId, accumulator: AccumulatorId) -> bool {
        self.get(surface)
            .is_some_and(|s| s.binding == Some(accumulator))
    }

    /// HTML of every visible surface, in order.
    pub fn to_html(&self) -> String {
        self.surfaces
            .iter()
            .filter(|s| s.visible)
            .map(Surface::to_html)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
