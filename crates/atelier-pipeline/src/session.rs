//! Carousel composer state and its reducer.
//!
//! All state changes go through [`ComposerState::reduce`], which returns
//! the side effects ([`Command`]s) the driver must run. The reducer never
//! renders or talks to the network itself, so every transition can be
//! tested synchronously.
//!
//! # Staging lifecycle
//!
//! ```text
//! Idle ──Generate──▶ Composing ──RequestSent──▶ AwaitingRemote
//!                        │                            │
//!                        └────────StagingFailed───────┼──▶ Failed
//!                                                     └──▶ Succeeded
//! ```
//!
//! `Generate` is accepted from any phase. Each one allocates a new
//! [`RequestId`]; results for older ids are dropped on arrival.

use std::fmt;

use crate::decode::SourceImage;
use crate::scene::{Scene, ScenePreset, combine_prompt};
use crate::view::ViewTransform;

/// One of the two carousel slides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideId {
    /// Slide 1: the framed original.
    Original,
    /// Slide 2: the staged scene.
    Staged,
}

impl SlideId {
    /// Both slides in carousel order.
    pub const ALL: [Self; 2] = [Self::Original, Self::Staged];

    /// Zero-based position.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Original => 0,
            Self::Staged => 1,
        }
    }

    /// One-based slide number as shown to the artist.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Original => 1,
            Self::Staged => 2,
        }
    }

    /// The other slide.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Original => Self::Staged,
            Self::Staged => Self::Original,
        }
    }
}

impl fmt::Display for SlideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slide {}", self.number())
    }
}

/// Identifies one staging attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// The raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the current staging attempt stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StagingPhase {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Slide 1 is being composed for the request.
    Composing {
        /// Attempt in progress.
        request: RequestId,
    },
    /// The request is on the wire.
    AwaitingRemote {
        /// Attempt in progress.
        request: RequestId,
    },
    /// The staged result became slide 2's base.
    Succeeded {
        /// Attempt that produced the current slide 2 base.
        request: RequestId,
    },
    /// The attempt failed; a new `Generate` may retry.
    Failed {
        /// Attempt that failed.
        request: RequestId,
        /// Message suitable for display.
        reason: String,
    },
}

impl StagingPhase {
    /// Whether an attempt is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Composing { .. } | Self::AwaitingRemote { .. })
    }

    /// The attempt this phase refers to.
    #[must_use]
    pub const fn request(&self) -> Option<RequestId> {
        match self {
            Self::Idle => None,
            Self::Composing { request }
            | Self::AwaitingRemote { request }
            | Self::Succeeded { request }
            | Self::Failed { request, .. } => Some(*request),
        }
    }

    /// The failure message, if the last attempt failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Everything the artist (or the driver) can do to the composer.
#[derive(Debug, Clone)]
pub enum Action {
    /// Change the active slide's zoom.
    SetZoom(f64),
    /// Change the active slide's horizontal offset.
    SetOffsetX(f64),
    /// Change the active slide's vertical offset.
    SetOffsetY(f64),
    /// Return the active slide's view to identity.
    ResetView,
    /// Show a particular slide.
    ShowSlide(SlideId),
    /// Advance to the next slide, wrapping.
    NextSlide,
    /// Choose the staging preset.
    SelectPreset(ScenePreset),
    /// Replace the artist's extra prompt.
    SetExtraPrompt(String),
    /// Start a staging attempt.
    Generate,
    /// Start over with a new original; slide 2 is discarded.
    ReplaceOriginal(SourceImage),
    /// The driver has sent the request.
    RequestSent {
        /// Attempt that was sent.
        request: RequestId,
    },
    /// The endpoint returned an image, already normalized.
    StagingSucceeded {
        /// Attempt that produced it.
        request: RequestId,
        /// Normalized slide 2 base.
        base: SourceImage,
    },
    /// The attempt failed.
    StagingFailed {
        /// Attempt that failed.
        request: RequestId,
        /// Message suitable for display.
        reason: String,
    },
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone)]
pub enum Command {
    /// Render a fresh preview for this slide from its current base and view.
    Recompose(SlideId),
    /// Drop this slide's preview.
    ClearPreview(SlideId),
    /// Run a staging attempt.
    Stage(StagingJob),
}

/// Inputs for one staging attempt, captured when it was requested.
#[derive(Debug, Clone)]
pub struct StagingJob {
    /// Attempt id to report back with.
    pub request: RequestId,
    /// Slide 1's base.
    pub source: SourceImage,
    /// Slide 1's view at the time of the request.
    pub view: ViewTransform,
    /// Endpoint scene.
    pub scene: Scene,
    /// Preset and artist prompts combined.
    pub prompt: String,
}

/// The whole composer state.
#[derive(Debug, Clone)]
pub struct ComposerState {
    original: SourceImage,
    staged_base: Option<SourceImage>,
    views: [ViewTransform; 2],
    active: SlideId,
    staging: StagingPhase,
    preset: ScenePreset,
    extra_prompt: String,
    next_request: u64,
}

impl ComposerState {
    /// Fresh state for `original`, showing slide 1 at identity.
    #[must_use]
    pub fn new(original: SourceImage) -> Self {
        Self {
            original,
            staged_base: None,
            views: [ViewTransform::IDENTITY; 2],
            active: SlideId::Original,
            staging: StagingPhase::Idle,
            preset: ScenePreset::default(),
            extra_prompt: String::new(),
            next_request: 0,
        }
    }

    /// The slide on screen.
    #[must_use]
    pub const fn active(&self) -> SlideId {
        self.active
    }

    /// Current staging phase.
    #[must_use]
    pub const fn staging(&self) -> &StagingPhase {
        &self.staging
    }

    /// View for `slide`.
    #[must_use]
    pub const fn view(&self, slide: SlideId) -> ViewTransform {
        self.views[slide.index()]
    }

    /// Base image for `slide`; slide 2 has none until staging succeeds.
    #[must_use]
    pub const fn base(&self, slide: SlideId) -> Option<&SourceImage> {
        match slide {
            SlideId::Original => Some(&self.original),
            SlideId::Staged => self.staged_base.as_ref(),
        }
    }

    /// Selected preset.
    #[must_use]
    pub const fn preset(&self) -> ScenePreset {
        self.preset
    }

    /// The artist's extra prompt.
    #[must_use]
    pub fn extra_prompt(&self) -> &str {
        &self.extra_prompt
    }

    /// The prompt a `Generate` would send right now.
    #[must_use]
    pub fn prompt(&self) -> String {
        combine_prompt(self.preset.prompt(), &self.extra_prompt)
    }

    /// Whether view controls are disabled: slide 2 is showing but has
    /// nothing to adjust yet.
    #[must_use]
    pub const fn sliders_locked(&self) -> bool {
        matches!(self.active, SlideId::Staged) && self.staged_base.is_none()
    }

    /// Apply `action`, returning the side effects to run.
    pub fn reduce(&mut self, action: Action) -> Vec<Command> {
        match action {
            Action::SetZoom(zoom) => self.update_view(|v| v.with_zoom(zoom)),
            Action::SetOffsetX(x) => self.update_view(|v| v.with_offset_x(x)),
            Action::SetOffsetY(y) => self.update_view(|v| v.with_offset_y(y)),
            Action::ResetView => self.update_view(|_| ViewTransform::IDENTITY),
            Action::ShowSlide(slide) => {
                self.active = slide;
                Vec::new()
            }
            Action::NextSlide => {
                self.active = self.active.other();
                Vec::new()
            }
            Action::SelectPreset(preset) => {
                self.preset = preset;
                Vec::new()
            }
            Action::SetExtraPrompt(prompt) => {
                self.extra_prompt = prompt;
                Vec::new()
            }
            Action::Generate => vec![Command::Stage(self.begin_staging())],
            Action::ReplaceOriginal(original) => {
                let superseded = self.staging.is_busy();
                *self = Self {
                    preset: self.preset,
                    extra_prompt: std::mem::take(&mut self.extra_prompt),
                    next_request: self.next_request,
                    ..Self::new(original)
                };
                if superseded {
                    tracing::debug!("new original supersedes in-flight staging");
                }
                vec![
                    Command::Recompose(SlideId::Original),
                    Command::ClearPreview(SlideId::Staged),
                ]
            }
            Action::RequestSent { request } => {
                if self.staging == (StagingPhase::Composing { request }) {
                    self.staging = StagingPhase::AwaitingRemote { request };
                }
                Vec::new()
            }
            Action::StagingSucceeded { request, base } => {
                if !self.is_pending(request) {
                    tracing::debug!(%request, "discarding superseded staging result");
                    return Vec::new();
                }
                tracing::info!(%request, dimensions = %base.dimensions(), "staging succeeded");
                self.staged_base = Some(base);
                self.active = SlideId::Staged;
                self.staging = StagingPhase::Succeeded { request };
                vec![Command::Recompose(SlideId::Staged)]
            }
            Action::StagingFailed { request, reason } => {
                if !self.is_pending(request) {
                    tracing::debug!(%request, "discarding superseded staging failure");
                    return Vec::new();
                }
                tracing::info!(%request, %reason, "staging failed");
                self.staging = StagingPhase::Failed { request, reason };
                Vec::new()
            }
        }
    }

    fn update_view(&mut self, f: impl FnOnce(ViewTransform) -> ViewTransform) -> Vec<Command> {
        if self.sliders_locked() {
            return Vec::new();
        }
        let slot = &mut self.views[self.active.index()];
        let next = f(*slot);
        if next == *slot {
            return Vec::new();
        }
        *slot = next;
        vec![Command::Recompose(self.active)]
    }

    fn begin_staging(&mut self) -> StagingJob {
        self.next_request += 1;
        let request = RequestId(self.next_request);
        if let Some(previous) = self.staging.request().filter(|_| self.staging.is_busy()) {
            tracing::debug!(%previous, %request, "superseding staging request");
        }
        self.staging = StagingPhase::Composing { request };
        let prompt = self.prompt();
        tracing::debug!(%request, scene = %self.preset.scene(), prompt_len = prompt.len(), "staging requested");
        StagingJob {
            request,
            source: self.original.clone(),
            view: self.view(SlideId::Original),
            scene: self.preset.scene(),
            prompt,
        }
    }

    fn is_pending(&self, request: RequestId) -> bool {
        self.staging.is_busy() && self.staging.request() == Some(request)
    }
}
