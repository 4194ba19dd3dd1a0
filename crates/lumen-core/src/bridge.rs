//! Backend bridge callbacks.
//!
//! The host application delivers model output as discrete callbacks. Each one
//! is a [`BridgeEvent`]; [`Workspace::handle`] applies it to the chat or the
//! multi-agent results area and returns the [`UiEffect`]s the host should
//! carry out. Events are also the JSON-lines format read by `lumen replay`.
//!
//! Events that arrive for a message or run that no longer exists are
//! dropped. They never fail.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::affordance::CopyAffordance;
use crate::config::{Config, Labels};
use crate::effects::{Area, UiEffect};
use crate::markdown::escape_html;
use crate::render::{ContentRenderer, wrap_html_document};
use crate::steps::StepSequencer;
use crate::stream::{FinalizeOutcome, StreamAccumulator};
use crate::surface::{SurfaceContent, SurfaceId, SurfaceKind, Transcript};

/// Which view is in front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveView {
    #[default]
    Chat,
    /// The multi-agent run panel.
    Maestro,
}

/// One bridge callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    // Chat
    NewChat,
    UserMessage {
        content: String,
    },
    AppendChunk {
        text: String,
    },
    Finalize,
    ShowError {
        message: String,
    },

    // Workflow run inside the chat
    StartWorkflow,
    StartStep {
        title: String,
        #[serde(default)]
        initial: String,
    },
    AppendToStep {
        text: String,
    },
    FinalizeStep {
        title: String,
        #[serde(default)]
        content: String,
    },
    FinalizeCurrentStep {
        content: String,
    },
    HideCurrentStep,
    FinalizeWithData {
        content: String,
    },

    // Multi-agent run panel
    StartRun,
    UpdateStatus {
        message: String,
    },
    RunStepStarted {
        title: String,
        #[serde(default)]
        initial: String,
    },
    RunStepChunk {
        text: String,
    },
    RunStepFinalized {
        title: String,
        #[serde(default)]
        content: String,
    },
    FinalReportPending {
        message: String,
    },
    FinalReport {
        content: String,
    },
    RunError {
        message: String,
    },

    SwitchView {
        view: ActiveView,
    },
}

/// A line of an event log that is not a valid event.
#[derive(Debug, thiserror::Error)]
#[error("Invalid event on line {line}: {source}")]
pub struct EventParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Parses a JSON-lines event log. Blank lines and lines starting with `#`
/// are skipped.
pub fn parse_events(input: &str) -> Result<Vec<BridgeEvent>, EventParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| EventParseError {
                line: index + 1,
                source,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A workflow run shown as a message in the chat.
#[derive(Debug)]
struct WorkflowRun {
    surface: SurfaceId,
    steps: StepSequencer,
}

/// The direct chat.
#[derive(Debug, Default)]
pub struct ChatSession {
    pub transcript: Transcript,
    history: Vec<ChatMessage>,
    current: Option<StreamAccumulator>,
    workflow: Option<WorkflowRun>,
}

impl ChatSession {
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The accumulator of the message currently streaming, if any.
    pub fn current(&self) -> Option<&StreamAccumulator> {
        self.current.as_ref()
    }
}

/// The multi-agent results area and its status line.
#[derive(Debug, Default)]
pub struct RunPanel {
    pub status: String,
    pub results: Transcript,
    steps: StepSequencer,
    loader: Option<SurfaceId>,
}

impl RunPanel {
    pub fn steps(&self) -> &StepSequencer {
        &self.steps
    }
}

/// Everything the bridge callbacks act on.
#[derive(Debug)]
pub struct Workspace {
    renderer: ContentRenderer,
    labels: Labels,
    pub view: ActiveView,
    pub chat: ChatSession,
    pub maestro: RunPanel,
    /// Copy buttons currently showing the "copied" label.
    copied: BTreeMap<(Area, SurfaceId, usize), CopyAffordance>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(ContentRenderer::default(), &Config::default())
    }
}

impl Workspace {
    pub fn new(renderer: ContentRenderer, config: &Config) -> Self {
        let labels = config.labels.clone();
        Self {
            renderer,
            view: ActiveView::Chat,
            chat: ChatSession::default(),
            maestro: RunPanel {
                steps: StepSequencer::new(&labels),
                ..RunPanel::default()
            },
            labels,
            copied: BTreeMap::new(),
        }
    }

    pub fn renderer(&self) -> &ContentRenderer {
        &self.renderer
    }

    /// Applies one event.
    pub fn handle(&mut self, event: &BridgeEvent) -> Vec<UiEffect> {
        tracing::debug!(?event, view = ?self.view, "bridge event");
        match event {
            BridgeEvent::NewChat => self.new_chat(),
            BridgeEvent::UserMessage { content } => self.user_message(content),
            BridgeEvent::AppendChunk { text } => self.append_chunk(text),
            BridgeEvent::Finalize => self.finalize(),
            BridgeEvent::ShowError { message } => self.show_error(message),

            BridgeEvent::StartWorkflow => self.start_workflow(),
            BridgeEvent::StartStep { title, initial } => self.start_step(title, initial),
            BridgeEvent::AppendToStep { text } => self.append_to_step(text),
            BridgeEvent::FinalizeStep { title, content } => {
                self.finalize_workflow_step(Some(title.as_str()), content)
            }
            BridgeEvent::FinalizeCurrentStep { content } => {
                self.finalize_workflow_step(None, content)
            }
            BridgeEvent::HideCurrentStep => self.hide_step(),
            BridgeEvent::FinalizeWithData { content } => self.finalize_with_data(content),

            BridgeEvent::StartRun => self.start_run(),
            BridgeEvent::UpdateStatus { message } => {
                self.maestro.status.clone_from(message);
                Vec::new()
            }
            BridgeEvent::RunStepStarted { title, initial } => {
                self.maestro
                    .steps
                    .start_step_with(&mut self.maestro.results, title, initial);
                vec![scroll(Area::Results)]
            }
            BridgeEvent::RunStepChunk { text } => {
                if self
                    .maestro
                    .steps
                    .append_to_current_step(&mut self.maestro.results, text)
                {
                    vec![scroll(Area::Results)]
                } else {
                    Vec::new()
                }
            }
            BridgeEvent::RunStepFinalized { title, content } => {
                self.maestro.steps.finalize_step(
                    &mut self.maestro.results,
                    &self.renderer,
                    title,
                    content,
                );
                vec![scroll(Area::Results)]
            }
            BridgeEvent::FinalReportPending { message } => self.final_report_pending(message),
            BridgeEvent::FinalReport { content } => self.final_report(content),
            BridgeEvent::RunError { message } => self.run_error(message),

            BridgeEvent::SwitchView { view } => {
                self.view = *view;
                Vec::new()
            }
        }
    }

    /// HTML of the area that is in front.
    pub fn to_html(&self) -> String {
        match self.view {
            ActiveView::Chat => self.area_html(Area::Chat),
            ActiveView::Maestro => self.area_html(Area::Results),
        }
    }

    /// HTML of one area. The results area is preceded by its status line.
    pub fn area_html(&self, area: Area) -> String {
        match area {
            Area::Chat => self.chat.transcript.to_html(),
            Area::Results => {
                let status = format!(
                    "<div class=\"status\">{}</div>",
                    escape_html(&self.maestro.status)
                );
                let results = self.maestro.results.to_html();
                if results.is_empty() {
                    status
                } else {
                    format!("{status}\n{results}")
                }
            }
        }
    }

    /// Effects for a click on a code block's copy or preview button.
    ///
    /// Copy puts the block's text on the clipboard and flips the button to
    /// the "copied" label until [`tick`](Self::tick) reverts it. Nothing is
    /// returned if the surface or block does not exist, or if preview was
    /// requested for a block that is not markup.
    pub fn code_action(
        &mut self,
        area: Area,
        surface: SurfaceId,
        index: usize,
        preview: bool,
        now: Instant,
    ) -> Vec<UiEffect> {
        let transcript = match area {
            Area::Chat => &self.chat.transcript,
            Area::Results => &self.maestro.results,
        };
        let Some(block) = transcript.get(surface).and_then(|s| match &s.content {
            SurfaceContent::Rendered(message) => message.code_blocks().get(index),
            _ => None,
        }) else {
            tracing::debug!(?area, ?surface, index, "code action on missing block");
            return Vec::new();
        };

        if preview {
            return if block.previewable {
                vec![UiEffect::OpenPreview {
                    html: block.text.clone(),
                }]
            } else {
                Vec::new()
            };
        }

        let text = block.text.clone();
        let copy = self
            .copied
            .entry((area, surface, index))
            .or_insert_with(|| CopyAffordance::new(&self.labels, self.renderer.code_config()));
        copy.activate(now);
        vec![
            UiEffect::CopyToClipboard { text },
            UiEffect::SetCopyLabel {
                area,
                surface,
                index,
                label: copy.label(now).to_string(),
            },
        ]
    }

    /// Reverts copy buttons whose "copied" label has expired.
    pub fn tick(&mut self, now: Instant) -> Vec<UiEffect> {
        let mut effects = Vec::new();
        self.copied.retain(|&(area, surface, index), copy| {
            if !copy.tick(now) {
                return true;
            }
            effects.push(UiEffect::SetCopyLabel {
                area,
                surface,
                index,
                label: copy.label(now).to_string(),
            });
            false
        });
        effects
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    fn new_chat(&mut self) -> Vec<UiEffect> {
        if let Some(mut retired) = self.chat.current.take() {
            retired.abort(&mut self.chat.transcript);
        }
        self.chat.transcript.clear();
        self.chat.history.clear();
        self.chat.workflow = None;
        tracing::info!("new chat");
        vec![UiEffect::ReleaseControls]
    }

    fn user_message(&mut self, content: &str) -> Vec<UiEffect> {
        let chat = &mut self.chat;
        if let Some(mut retired) = chat.current.take() {
            retired.abort(&mut chat.transcript);
        }

        chat.transcript
            .push(SurfaceKind::User, SurfaceContent::Text(content.to_string()));
        chat.history.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
        });

        let surface = chat
            .transcript
            .push(SurfaceKind::Assistant, SurfaceContent::Pending);
        let mut accumulator = StreamAccumulator::new();
        accumulator.start(&mut chat.transcript, surface);
        chat.current = Some(accumulator);

        vec![UiEffect::LockControls, scroll(Area::Chat)]
    }

    fn append_chunk(&mut self, text: &str) -> Vec<UiEffect> {
        let Some(accumulator) = self.chat.current.as_mut() else {
            tracing::debug!("chunk dropped: no message streaming");
            return Vec::new();
        };
        if accumulator.append_chunk(&mut self.chat.transcript, text) {
            vec![scroll(Area::Chat)]
        } else {
            Vec::new()
        }
    }

    fn finalize(&mut self) -> Vec<UiEffect> {
        let Some(accumulator) = self.chat.current.as_mut() else {
            return vec![UiEffect::ReleaseControls];
        };

        match accumulator.finalize(&mut self.chat.transcript, &self.renderer) {
            FinalizeOutcome::Committed(text) => {
                self.chat.history.push(ChatMessage {
                    role: Role::Assistant,
                    content: text,
                });
                self.chat.current = None;
                vec![scroll(Area::Chat), UiEffect::ReleaseControls]
            }
            FinalizeOutcome::Empty | FinalizeOutcome::Ignored => {
                self.chat.current = None;
                vec![UiEffect::ReleaseControls]
            }
        }
    }

    fn show_error(&mut self, message: &str) -> Vec<UiEffect> {
        let text = self.error_text(message);
        match self.chat.current.take() {
            Some(mut accumulator) => {
                accumulator.fail(&mut self.chat.transcript, &text);
            }
            None => {
                tracing::warn!(%message, "backend error");
                self.chat
                    .transcript
                    .push(SurfaceKind::Error, SurfaceContent::Error(text));
            }
        }
        vec![scroll(Area::Chat), UiEffect::ReleaseControls]
    }

    // ------------------------------------------------------------------
    // Workflow in the chat
    // ------------------------------------------------------------------

    fn start_workflow(&mut self) -> Vec<UiEffect> {
        let surface = self
            .chat
            .transcript
            .push(SurfaceKind::Workflow, SurfaceContent::Empty);
        self.chat.workflow = Some(WorkflowRun {
            surface,
            steps: StepSequencer::new(&self.labels),
        });
        tracing::info!("workflow started");
        vec![UiEffect::LockControls, scroll(Area::Chat)]
    }

    /// The chat workflow's steps and the transcript they write to, unless the
    /// run panel is in front or no workflow is active.
    fn chat_workflow(&mut self) -> Option<(&mut StepSequencer, &mut Transcript, &ContentRenderer)> {
        if self.view == ActiveView::Maestro {
            tracing::debug!("workflow callback ignored: run panel is active");
            return None;
        }
        let run = self.chat.workflow.as_mut()?;
        Some((&mut run.steps, &mut self.chat.transcript, &self.renderer))
    }

    fn start_step(&mut self, title: &str, initial: &str) -> Vec<UiEffect> {
        let Some((steps, transcript, renderer)) = self.chat_workflow() else {
            return Vec::new();
        };
        steps.start_step(transcript, title);
        if !initial.is_empty() {
            steps.finalize_current_step(transcript, renderer, initial);
        }
        vec![scroll(Area::Chat)]
    }

    fn append_to_step(&mut self, text: &str) -> Vec<UiEffect> {
        let Some((steps, transcript, _)) = self.chat_workflow() else {
            return Vec::new();
        };
        if steps.append_to_current_step(transcript, text) {
            vec![scroll(Area::Chat)]
        } else {
            Vec::new()
        }
    }

    fn finalize_workflow_step(&mut self, title: Option<&str>, content: &str) -> Vec<UiEffect> {
        let Some((steps, transcript, renderer)) = self.chat_workflow() else {
            return Vec::new();
        };
        let finalized = match title {
            Some(title) => steps.finalize_step(transcript, renderer, title, content),
            None => steps.finalize_current_step(transcript, renderer, content),
        };
        if finalized {
            vec![scroll(Area::Chat)]
        } else {
            Vec::new()
        }
    }

    fn hide_step(&mut self) -> Vec<UiEffect> {
        if let Some((steps, transcript, _)) = self.chat_workflow() {
            steps.hide_current_step(transcript);
        }
        Vec::new()
    }

    fn finalize_with_data(&mut self, content: &str) -> Vec<UiEffect> {
        let wrapped = wrap_html_document(content);
        let content = wrapped.as_deref().unwrap_or(content);

        if self.view == ActiveView::Maestro {
            let rendered = self.renderer.render(content);
            let panel = &mut self.maestro;
            panel.results.clear();
            panel.loader = None;
            panel
                .results
                .push(SurfaceKind::Report, SurfaceContent::Rendered(rendered));
            panel.status.clone_from(&self.labels.run_complete);
            tracing::info!("run finished");
            return vec![scroll(Area::Results), UiEffect::ReleaseControls];
        }

        let rendered = SurfaceContent::Rendered(self.renderer.render(content));
        let run = self.chat.workflow.take();
        match run
            .as_ref()
            .and_then(|run| self.chat.transcript.get_mut(run.surface))
        {
            Some(surface) => surface.content = rendered,
            None => {
                self.chat.transcript.push(SurfaceKind::Workflow, rendered);
            }
        }
        tracing::info!(
            steps = run.map_or(0, |run| run.steps.len()),
            "workflow finished"
        );
        vec![scroll(Area::Chat), UiEffect::ReleaseControls]
    }

    // ------------------------------------------------------------------
    // Run panel
    // ------------------------------------------------------------------

    fn start_run(&mut self) -> Vec<UiEffect> {
        let panel = &mut self.maestro;
        panel.results.clear();
        panel.steps.reset();
        panel.loader = None;
        tracing::info!("run started");
        vec![UiEffect::LockControls]
    }

    fn final_report_pending(&mut self, message: &str) -> Vec<UiEffect> {
        let panel = &mut self.maestro;
        if let Some(old) = panel.loader.take() {
            panel.results.remove(old);
        }
        let loader = panel
            .results
            .push(SurfaceKind::Loader, SurfaceContent::Text(message.to_string()));
        panel.loader = Some(loader);
        vec![scroll(Area::Results)]
    }

    fn final_report(&mut self, content: &str) -> Vec<UiEffect> {
        let rendered = self.renderer.render(content);
        let panel = &mut self.maestro;
        if let Some(loader) = panel.loader.take() {
            panel.results.remove(loader);
        }
        panel
            .results
            .push(SurfaceKind::Report, SurfaceContent::Rendered(rendered));
        tracing::info!("final report shown");
        vec![scroll(Area::Results), UiEffect::ReleaseControls]
    }

    fn run_error(&mut self, message: &str) -> Vec<UiEffect> {
        let text = self.error_text(message);
        let panel = &mut self.maestro;
        panel.steps.fail_open_steps(&mut panel.results);
        panel.results.clear();
        panel.loader = None;
        panel
            .results
            .push(SurfaceKind::Error, SurfaceContent::Error(text));
        panel.status.clone_from(&self.labels.run_failed);
        tracing::warn!(%message, "run failed");
        vec![UiEffect::ReleaseControls]
    }

    fn error_text(&self, message: &str) -> String {
        if self.labels.error_prefix.is_empty() {
            message.to_string()
        } else {
            format!("{}: {message}", self.labels.error_prefix)
        }
    }
}

fn scroll(area: Area) -> UiEffect {
    UiEffect::ScrollToBottom { area }
}
