//! UI effect types.
//!
//! Effects are returned by the bridge dispatcher for the host UI to carry out.
//! The dispatcher itself only mutates surfaces; anything outside the rendered
//! content (input controls, scrolling, clipboard, preview windows) is
//! expressed as an effect.

use serde::Serialize;

use crate::surface::SurfaceId;

/// Which area an effect applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Chat,
    Results,
}

/// Effects returned by [`Workspace::handle`](crate::bridge::Workspace::handle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum UiEffect {
    /// Disable input while a response is in flight.
    LockControls,

    /// Re-enable input. Emitted on every terminal path (finalize, error).
    ReleaseControls,

    /// Keep the newest content in view.
    ScrollToBottom { area: Area },

    /// Put text on the system clipboard.
    CopyToClipboard { text: String },

    /// Relabel one code block's copy button (`Copied!`, then back to `Copy`).
    SetCopyLabel {
        area: Area,
        surface: SurfaceId,
        index: usize,
        label: String,
    },

    /// Show a markup document in an isolated preview.
    OpenPreview { html: String },
}
