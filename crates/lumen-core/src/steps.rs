//! Multi-step runs.
//!
//! A workflow or multi-agent run produces one step per stage. Each step owns a
//! surface and a [`StreamAccumulator`]. Finalize signals are matched by title
//! to the most recent step that is still open, so a late signal for an earlier
//! step lands on that step and not on whatever happens to be last.

use crate::config::Labels;
use crate::render::ContentRenderer;
use crate::stream::{FinalizeOutcome, StreamAccumulator, StreamState};
use crate::surface::{Surface, SurfaceContent, SurfaceId, SurfaceKind, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Streaming,
    Finalized,
    Errored,
}

impl StepState {
    pub fn is_open(self) -> bool {
        matches!(self, StepState::Pending | StepState::Streaming)
    }
}

impl From<StreamState> for StepState {
    fn from(state: StreamState) -> Self {
        match state {
            StreamState::Idle => StepState::Pending,
            StreamState::Streaming => StepState::Streaming,
            StreamState::Finalized => StepState::Finalized,
            StreamState::Errored => StepState::Errored,
        }
    }
}

#[derive(Debug)]
pub struct Step {
    pub title: String,
    pub surface: SurfaceId,
    accumulator: StreamAccumulator,
    pub visible: bool,
}

impl Step {
    pub fn state(&self) -> StepState {
        self.accumulator.state().into()
    }

    /// Text streamed into this step so far.
    pub fn text(&self) -> &str {
        self.accumulator.text()
    }
}

/// Ordered steps of one run.
#[derive(Debug, Default)]
pub struct StepSequencer {
    steps: Vec<Step>,
    running_prefix: String,
    done_prefix: String,
    failed_prefix: String,
}

impl StepSequencer {
    pub fn new(labels: &Labels) -> Self {
        Self {
            steps: Vec::new(),
            running_prefix: labels.step_running.clone(),
            done_prefix: labels.step_done.clone(),
            failed_prefix: labels.step_failed.clone(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Forgets every step. Surfaces are left to the caller.
    pub fn reset(&mut self) {
        self.steps.clear();
    }

    /// Appends a streaming step with its own surface.
    pub fn start_step(&mut self, transcript: &mut Transcript, title: &str) -> SurfaceId {
        let mut surface = Surface::new(SurfaceKind::Step, SurfaceContent::Pending);
        surface.header = Some(prefixed(&self.running_prefix, title));
        let surface_id = transcript.push_surface(surface);

        let mut accumulator = StreamAccumulator::new();
        accumulator.start(transcript, surface_id);

        tracing::info!(title, index = self.steps.len(), "step started");
        self.steps.push(Step {
            title: title.to_string(),
            surface: surface_id,
            accumulator,
            visible: true,
        });
        surface_id
    }

    /// Starts a step whose first chunk is already known.
    pub fn start_step_with(
        &mut self,
        transcript: &mut Transcript,
        title: &str,
        initial: &str,
    ) -> SurfaceId {
        let surface = self.start_step(transcript, title);
        if !initial.is_empty() {
            self.append_to_current_step(transcript, initial);
        }
        surface
    }

    /// Appends to the most recently started step that is still streaming.
    pub fn append_to_current_step(&mut self, transcript: &mut Transcript, text: &str) -> bool {
        match self.current_index() {
            Some(index) => self.steps[index].accumulator.append_chunk(transcript, text),
            None => {
                tracing::debug!("chunk for step dropped: no open step");
                false
            }
        }
    }

    /// Finalizes the most recent open step titled `title`.
    ///
    /// Non-empty `content` replaces the streamed text. With no open step of
    /// that title the signal is dropped and false is returned.
    pub fn finalize_step(
        &mut self,
        transcript: &mut Transcript,
        renderer: &ContentRenderer,
        title: &str,
        content: &str,
    ) -> bool {
        let Some(index) = self
            .steps
            .iter()
            .rposition(|s| s.title == title && s.state().is_open())
        else {
            tracing::warn!(title, "finalize dropped: no open step with this title");
            return false;
        };
        self.finalize_at(index, transcript, renderer, content)
    }

    /// Finalizes the most recent open step regardless of title.
    pub fn finalize_current_step(
        &mut self,
        transcript: &mut Transcript,
        renderer: &ContentRenderer,
        content: &str,
    ) -> bool {
        let Some(index) = self.current_index() else {
            tracing::warn!("finalize dropped: no open step");
            return false;
        };
        self.finalize_at(index, transcript, renderer, content)
    }

    fn finalize_at(
        &mut self,
        index: usize,
        transcript: &mut Transcript,
        renderer: &ContentRenderer,
        content: &str,
    ) -> bool {
        let step = &mut self.steps[index];
        let outcome = step.accumulator.finalize_with(transcript, renderer, content);
        if matches!(outcome, FinalizeOutcome::Ignored) {
            return false;
        }
        if let Some(surface) = transcript.get_mut(step.surface) {
            surface.header = Some(prefixed(&self.done_prefix, &step.title));
            if outcome == FinalizeOutcome::Empty {
                surface.content = SurfaceContent::Rendered(renderer.render(""));
            }
        }
        tracing::info!(title = %step.title, index, "step finalized");
        true
    }

    /// Hides the last step without finalizing it. Its output still streams,
    /// it just isn't shown.
    pub fn hide_current_step(&mut self, transcript: &mut Transcript) -> bool {
        let Some(step) = self.steps.last_mut() else {
            return false;
        };
        step.visible = false;
        if let Some(surface) = transcript.get_mut(step.surface) {
            surface.visible = false;
        }
        true
    }

    /// Marks every open step as errored, keeping whatever text they showed.
    pub fn fail_open_steps(&mut self, transcript: &mut Transcript) -> usize {
        let mut failed = 0;
        for step in self.steps.iter_mut().filter(|s| s.state().is_open()) {
            step.accumulator.abort(transcript);
            if let Some(surface) = transcript.get_mut(step.surface) {
                surface.header = Some(prefixed(&self.failed_prefix, &step.title));
            }
            failed += 1;
        }
        if failed > 0 {
            tracing::warn!(failed, "open steps marked errored");
        }
        failed
    }

    fn current_index(&self) -> Option<usize> {
        self.steps.iter().rposition(|s| s.state().is_open())
    }
}

fn prefixed(prefix: &str, title: &str) -> String {
    if prefix.is_empty() {
        title.to_string()
    } else {
        format!("{prefix} {title}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Transcript, StepSequencer, ContentRenderer) {
        (
            Transcript::new(),
            StepSequencer::new(&Labels::default()),
            ContentRenderer::default(),
        )
    }

    fn header(transcript: &Transcript, surface: SurfaceId) -> String {
        transcript.get(surface).unwrap().header.clone().unwrap()
    }

    #[test]
    fn test_start_step_streams() {
        let (mut transcript, mut steps, _) = setup();
        let surface = steps.start_step(&mut transcript, "Research");
        assert_eq!(steps.steps()[0].state(), StepState::Streaming);
        assert_eq!(header(&transcript, surface), "Agent running: Research");
    }

    #[test]
    fn test_finalize_matches_title_not_position() {
        let (mut transcript, mut steps, renderer) = setup();
        let a = steps.start_step(&mut transcript, "A");
        let b = steps.start_step(&mut transcript, "B");

        assert!(steps.finalize_step(&mut transcript, &renderer, "A", "x"));
        assert_eq!(steps.steps()[0].state(), StepState::Finalized);
        assert_eq!(steps.steps()[1].state(), StepState::Streaming);
        assert_eq!(
            transcript.get(a).unwrap().content,
            SurfaceContent::Rendered(renderer.render("x"))
        );
        assert_eq!(header(&transcript, a), "✓ A");
        assert_eq!(transcript.get(b).unwrap().content, SurfaceContent::Pending);
    }

    #[test]
    fn test_finalize_picks_most_recent_open_duplicate() {
        let (mut transcript, mut steps, renderer) = setup();
        steps.start_step(&mut transcript, "Agent");
        steps.start_step(&mut transcript, "Agent");

        assert!(steps.finalize_step(&mut transcript, &renderer, "Agent", "second"));
        assert_eq!(steps.steps()[0].state(), StepState::Streaming);
        assert_eq!(steps.steps()[1].state(), StepState::Finalized);

        assert!(steps.finalize_step(&mut transcript, &renderer, "Agent", "first"));
        assert_eq!(steps.steps()[0].state(), StepState::Finalized);
    }

    #[test]
    fn test_unmatched_finalize_dropped() {
        let (mut transcript, mut steps, renderer) = setup();
        steps.start_step(&mut transcript, "A");
        let before = transcript.clone();

        assert!(!steps.finalize_step(&mut transcript, &renderer, "Z", "x"));
        assert_eq!(transcript, before);
    }

    #[test]
    fn test_duplicate_finalize_does_not_corrupt() {
        let (mut transcript, mut steps, renderer) = setup();
        let a = steps.start_step(&mut transcript, "A");
        steps.finalize_step(&mut transcript, &renderer, "A", "first");
        let rendered = transcript.get(a).unwrap().content.clone();

        assert!(!steps.finalize_step(&mut transcript, &renderer, "A", "second"));
        assert_eq!(transcript.get(a).unwrap().content, rendered);
    }

    #[test]
    fn test_append_targets_latest_open_step() {
        let (mut transcript, mut steps, renderer) = setup();
        steps.start_step(&mut transcript, "A");
        let b = steps.start_step(&mut transcript, "B");
        assert!(steps.append_to_current_step(&mut transcript, "to B"));
        assert_eq!(
            transcript.get(b).unwrap().content,
            SurfaceContent::Streaming("to B".to_string())
        );

        steps.finalize_step(&mut transcript, &renderer, "B", "");
        assert!(steps.append_to_current_step(&mut transcript, "to A"));
        assert_eq!(steps.steps()[0].text(), "to A");
    }

    #[test]
    fn test_append_with_no_open_step_dropped() {
        let (mut transcript, mut steps, _) = setup();
        assert!(!steps.append_to_current_step(&mut transcript, "x"));
    }

    #[test]
    fn test_finalize_with_empty_content_uses_stream() {
        let (mut transcript, mut steps, renderer) = setup();
        let a = steps.start_step_with(&mut transcript, "A", "Hel");
        steps.append_to_current_step(&mut transcript, "lo");
        steps.finalize_current_step(&mut transcript, &renderer, "");
        assert_eq!(
            transcript.get(a).unwrap().content,
            SurfaceContent::Rendered(renderer.render("Hello"))
        );
    }

    #[test]
    fn test_finalize_empty_step_shows_no_output() {
        let (mut transcript, mut steps, renderer) = setup();
        let a = steps.start_step(&mut transcript, "Quiet");
        assert!(steps.finalize_step(&mut transcript, &renderer, "Quiet", ""));
        assert!(matches!(
            transcript.get(a).unwrap().content,
            SurfaceContent::Rendered(crate::render::RenderedMessage::NoOutput { .. })
        ));
    }

    #[test]
    fn test_hide_current_step() {
        let (mut transcript, mut steps, _) = setup();
        let a = steps.start_step(&mut transcript, "A");
        assert!(steps.hide_current_step(&mut transcript));
        assert!(!transcript.get(a).unwrap().visible);
        assert_eq!(steps.steps()[0].state(), StepState::Streaming);
        assert!(steps.append_to_current_step(&mut transcript, "still flows"));
    }

    #[test]
    fn test_fail_open_steps() {
        let (mut transcript, mut steps, renderer) = setup();
        let a = steps.start_step(&mut transcript, "A");
        let b = steps.start_step(&mut transcript, "B");
        steps.finalize_step(&mut transcript, &renderer, "A", "ok");

        assert_eq!(steps.fail_open_steps(&mut transcript), 1);
        assert_eq!(steps.steps()[0].state(), StepState::Finalized);
        assert_eq!(steps.steps()[1].state(), StepState::Errored);
        assert_eq!(header(&transcript, a), "✓ A");
        assert_eq!(header(&transcript, b), "✗ B");
        assert!(!steps.finalize_step(&mut transcript, &renderer, "B", "late"));
    }

    #[test]
    fn test_step_markers_come_from_labels() {
        let labels = Labels {
            step_running: "Working:".to_string(),
            step_done: "[done]".to_string(),
            step_failed: String::new(),
            ..Labels::default()
        };
        let mut transcript = Transcript::new();
        let mut steps = StepSequencer::new(&labels);
        let renderer = ContentRenderer::default();

        let a = steps.start_step(&mut transcript, "A");
        let b = steps.start_step(&mut transcript, "B");
        assert_eq!(header(&transcript, a), "Working: A");

        steps.finalize_step(&mut transcript, &renderer, "A", "ok");
        steps.fail_open_steps(&mut transcript);
        assert_eq!(header(&transcript, a), "[done] A");
        assert_eq!(header(&transcript, b), "B");
    }
}
