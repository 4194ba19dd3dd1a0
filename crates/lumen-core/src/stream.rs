//! Incremental delivery of one message.
//!
//! A [`StreamAccumulator`] buffers chunks for a single logical message and
//! shows them verbatim on its bound surface while they arrive. `finalize`
//! hands the full text to the [`ContentRenderer`] exactly once.
//!
//! ```text
//! Idle ──start──▶ Streaming ──finalize──▶ Finalized
//!                     │
//!                     └──────fail───────▶ Errored
//! ```
//!
//! Calls that do not fit the current state are ignored, never errors: late
//! bridge callbacks after a new chat or a rebind must be harmless.

use crate::render::ContentRenderer;
use crate::surface::{AccumulatorId, SurfaceContent, SurfaceId, SurfaceKind, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Finalized,
    Errored,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Finalized | StreamState::Errored)
    }
}

/// Result of [`StreamAccumulator::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The text was rendered onto the surface. Carries the committed text.
    Committed(String),
    /// Nothing had been accumulated; nothing was rendered.
    Empty,
    /// Already finalized, errored, or retired.
    Ignored,
}

#[derive(Debug)]
pub struct StreamAccumulator {
    id: AccumulatorId,
    surface: Option<SurfaceId>,
    buffer: String,
    state: StreamState,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            id: AccumulatorId::new(),
            surface: None,
            buffer: String::new(),
            state: StreamState::Idle,
        }
    }

    pub fn id(&self) -> AccumulatorId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Text accumulated so far. Empty once finalized.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// True while streaming and still owning its surface.
    pub fn is_active(&self, transcript: &Transcript) -> bool {
        self.state == StreamState::Streaming
            && self
                .surface
                .is_some_and(|surface| transcript.is_bound(surface, self.id))
    }

    /// Binds the surface and shows the pending indicator.
    ///
    /// Only valid from `Idle`; returns false (and stays idle) if the
    /// accumulator was already started or the surface does not exist.
    pub fn start(&mut self, transcript: &mut Transcript, surface: SurfaceId) -> bool {
        if self.state != StreamState::Idle {
            tracing::debug!(accumulator = self.id.0, state = ?self.state, "start ignored");
            return false;
        }
        let Some(target) = transcript.get_mut(surface) else {
            tracing::warn!(surface = surface.0, "start on missing surface");
            return false;
        };
        target.content = SurfaceContent::Pending;
        transcript.bind(surface, self.id);

        self.surface = Some(surface);
        self.state = StreamState::Streaming;
        true
    }

    /// Appends a chunk and shows the whole accumulated text verbatim.
    ///
    /// Ignored unless streaming and still bound.
    pub fn append_chunk(&mut self, transcript: &mut Transcript, chunk: &str) -> bool {
        if !self.is_active(transcript) {
            tracing::debug!(accumulator = self.id.0, state = ?self.state, "chunk dropped");
            return false;
        }
        let Some(target) = self.surface.and_then(|id| transcript.get_mut(id)) else {
            return false;
        };
        self.buffer.push_str(chunk);
        target.content = SurfaceContent::Streaming(self.buffer.clone());
        true
    }

    /// Renders the accumulated text onto the surface, once.
    ///
    /// With nothing accumulated this is a no-op on the surface, but the
    /// accumulator still becomes `Finalized` and releases its binding.
    pub fn finalize(
        &mut self,
        transcript: &mut Transcript,
        renderer: &ContentRenderer,
    ) -> FinalizeOutcome {
        if self.state.is_terminal() {
            return FinalizeOutcome::Ignored;
        }

        let bound = self.is_active(transcript);
        let text = std::mem::take(&mut self.buffer);
        self.state = StreamState::Finalized;
        if let Some(surface) = self.surface {
            transcript.unbind(surface, self.id);
        }

        if self.surface.is_some() && !bound {
            tracing::debug!(accumulator = self.id.0, "finalize on retired accumulator");
            return FinalizeOutcome::Ignored;
        }
        if text.is_empty() {
            return FinalizeOutcome::Empty;
        }

        let rendered = renderer.render(&text);
        if let Some(target) = self.surface.and_then(|id| transcript.get_mut(id)) {
            target.content = SurfaceContent::Rendered(rendered);
        }
        FinalizeOutcome::Committed(text)
    }

    /// Replaces whatever was accumulated with `content`, then finalizes.
    ///
    /// Empty `content` keeps the accumulated text.
    pub fn finalize_with(
        &mut self,
        transcript: &mut Transcript,
        renderer: &ContentRenderer,
        content: &str,
    ) -> FinalizeOutcome {
        if self.state == StreamState::Streaming && !content.is_empty() {
            content.clone_into(&mut self.buffer);
        }
        self.finalize(transcript, renderer)
    }

    /// Removes the in-progress surface and shows an error in its place.
    ///
    /// Always shows the error. A finalized message is left in place.
    /// Returns the id of the error surface.
    pub fn fail(&mut self, transcript: &mut Transcript, message: &str) -> SurfaceId {
        if self.state != StreamState::Finalized {
            if let Some(surface) = self.surface
                && transcript.is_bound(surface, self.id)
            {
                transcript.remove(surface);
            }
            self.state = StreamState::Errored;
        }
        self.buffer.clear();
        tracing::warn!(accumulator = self.id.0, %message, "stream failed");
        transcript.push(SurfaceKind::Error, SurfaceContent::Error(message.to_string()))
    }

    /// Stops streaming without touching the surface: the partial text stays
    /// visible and further chunks are ignored.
    pub fn abort(&mut self, transcript: &mut Transcript) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(surface) = self.surface {
            transcript.unbind(surface, self.id);
        }
        self.state = StreamState::Errored;
    }
}
