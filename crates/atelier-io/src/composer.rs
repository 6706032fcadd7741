//! Async driver for the two-slide carousel.
//!
//! Wraps a [`ComposerState`] and runs the [`Command`]s its reducer emits:
//! renders go to the blocking pool and are committed through a
//! [`LatestOnly`] slot per slide, staging goes through a
//! [`StagingBackend`]. Each committed preview is also published as a JPEG
//! [`DisplayHandle`](crate::DisplayHandle) held in a [`HandleSlot`].
//!
//! [`CarouselComposer::dispatch`] runs renders to completion in order but
//! never waits on the network: each staging attempt is spawned as a
//! [`StagingTask`] that reports back through a channel, and its actions are
//! applied by [`CarouselComposer::pump`] or [`CarouselComposer::settle`].
//! View changes, slide switches and new attempts can be dispatched while
//! a request is outstanding; superseded results are dropped by the reducer.
//!
//! Callers that want overlapping renders use
//! [`CarouselComposer::begin_render`] and [`CarouselComposer::commit`]
//! directly; stale results are dropped at commit time.

use std::collections::VecDeque;
use std::sync::Arc;

use atelier_pipeline::{
    Action, Command, Commit, ComposerState, Composition, LatestOnly, PipelineError, Quality,
    RequestId, SlideId, SourceImage, SourceOrigin, StagingJob, StagingPhase, Ticket,
    ViewTransform, compose, normalize_data_url,
};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::config::Config;
use crate::display::{HandleRegistry, HandleSlot};
use crate::staging::{StagingBackend, StagingError, StagingRequest};

/// Errors from the carousel driver.
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// Composing or encoding a slide failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The staging backend failed.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// A staging attempt ended in [`StagingPhase::Failed`].
    #[error("staging {request} failed: {reason}")]
    StagingFailed {
        /// Attempt that failed.
        request: RequestId,
        /// Message shown to the artist.
        reason: String,
    },

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(#[from] JoinError),
}

#[derive(Debug, Default)]
struct SlidePreview {
    latest: LatestOnly<Arc<Composition>>,
    handle: HandleSlot,
}

/// A render captured at the moment it was requested.
#[derive(Debug, Clone)]
pub struct RenderJob {
    slide: SlideId,
    ticket: Ticket,
    base: SourceImage,
    view: ViewTransform,
    quality: Quality,
}

impl RenderJob {
    /// Slide this render is for.
    #[must_use]
    pub const fn slide(&self) -> SlideId {
        self.slide
    }

    /// View captured for this render.
    #[must_use]
    pub const fn view(&self) -> ViewTransform {
        self.view
    }

    /// Compose and encode on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::Pipeline`] if composing or encoding fails.
    pub async fn run(self) -> Result<Rendered, ComposerError> {
        let Self {
            slide,
            ticket,
            base,
            view,
            quality,
        } = self;
        let (composition, jpeg) = tokio::task::spawn_blocking(move || {
            let composition = compose(&base, view)?;
            let jpeg = composition.encode_jpeg(quality)?;
            Ok::<_, PipelineError>((composition, jpeg))
        })
        .await??;
        Ok(Rendered {
            slide,
            ticket,
            composition,
            jpeg,
        })
    }
}

/// A finished render waiting to be committed.
#[derive(Debug)]
pub struct Rendered {
    slide: SlideId,
    ticket: Ticket,
    composition: Composition,
    jpeg: Vec<u8>,
}

/// One staging attempt, detached from the composer so it can be spawned.
#[derive(Debug)]
pub struct StagingTask<B> {
    job: StagingJob,
    backend: Arc<B>,
    image_url: Option<String>,
    lang: String,
    quality: Quality,
}

impl<B: StagingBackend> StagingTask<B> {
    /// Attempt this task reports for.
    #[must_use]
    pub const fn request(&self) -> RequestId {
        self.job.request
    }

    /// Compose slide 1 as captured in the job and build the outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::Pipeline`] if composing or encoding fails.
    pub async fn prepare(&self) -> Result<StagingRequest, ComposerError> {
        let source = self.job.source.clone();
        let view = self.job.view;
        let quality = self.quality;
        let image_data =
            tokio::task::spawn_blocking(move || compose(&source, view)?.to_data_url(quality))
                .await??;
        Ok(StagingRequest {
            image_url: self.image_url.clone(),
            image_data,
            scene: self.job.scene,
            extra_prompt: self.job.prompt.clone(),
            lang: self.lang.clone(),
        })
    }

    /// Send `outbound` and turn the answer into the action that reports it.
    pub async fn send(&self, outbound: StagingRequest) -> Action {
        let request = self.request();
        match self.fetch_staged(outbound).await {
            Ok(base) => Action::StagingSucceeded { request, base },
            Err(err) => Action::StagingFailed {
                request,
                reason: err.to_string(),
            },
        }
    }

    /// Prepare and send, reporting `RequestSent` and then the outcome to
    /// `events`.
    pub async fn run(self, events: mpsc::UnboundedSender<Action>) {
        let request = self.request();
        let outcome = match self.prepare().await {
            Ok(outbound) => {
                // A closed channel means the composer is gone.
                let _ = events.send(Action::RequestSent { request });
                self.send(outbound).await
            }
            Err(err) => Action::StagingFailed {
                request,
                reason: err.to_string(),
            },
        };
        let _ = events.send(outcome);
    }

    async fn fetch_staged(&self, outbound: StagingRequest) -> Result<SourceImage, ComposerError> {
        let url = self.backend.stage(outbound).await?;
        let normalized = tokio::task::spawn_blocking(move || normalize_data_url(&url)).await??;
        Ok(SourceImage::from_raster(
            normalized.into_raster(),
            SourceOrigin::Staged,
        ))
    }
}

/// Carousel composer bound to a staging backend.
///
/// Dropping the composer aborts any staging attempt still in flight.
#[derive(Debug)]
pub struct CarouselComposer<B> {
    state: ComposerState,
    backend: Arc<B>,
    registry: HandleRegistry,
    previews: [SlidePreview; 2],
    lang: String,
    image_url: Option<String>,
    output_quality: Quality,
    events: mpsc::UnboundedSender<Action>,
    inbox: mpsc::UnboundedReceiver<Action>,
    in_flight: JoinSet<()>,
}

impl<B: StagingBackend + 'static> CarouselComposer<B> {
    /// A composer for `original` with no previews rendered yet.
    #[must_use]
    pub fn new(
        original: SourceImage,
        backend: B,
        registry: HandleRegistry,
        config: &Config,
    ) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        Self {
            state: ComposerState::new(original),
            backend: Arc::new(backend),
            registry,
            previews: Default::default(),
            lang: config.lang.clone(),
            image_url: None,
            output_quality: config.output_quality(),
            events,
            inbox,
            in_flight: JoinSet::new(),
        }
    }

    /// A composer for `original` with slide 1 already rendered.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::Pipeline`] if the first render fails.
    pub async fn open(
        original: SourceImage,
        backend: B,
        registry: HandleRegistry,
        config: &Config,
    ) -> Result<Self, ComposerError> {
        let mut composer = Self::new(original, backend, registry, config);
        composer.recompose(SlideId::Original).await?;
        Ok(composer)
    }

    /// Public URL of the artwork, sent along with staging requests.
    pub fn set_image_url(&mut self, url: Option<String>) {
        self.image_url = url;
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ComposerState {
        &self.state
    }

    /// The staging backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Registry the preview handles live in.
    #[must_use]
    pub const fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Most recently committed preview of `slide`.
    #[must_use]
    pub fn preview(&self, slide: SlideId) -> Option<&Composition> {
        self.previews[slide.index()].latest.get().map(|c| &**c)
    }

    /// Display URL of `slide`'s preview.
    #[must_use]
    pub fn preview_url(&self, slide: SlideId) -> Option<String> {
        self.previews[slide.index()].handle.url()
    }

    /// Apply `action` and run the commands it produces.
    ///
    /// Renders finish before this returns. A staging attempt is only
    /// started; its result arrives through [`Self::pump`].
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::Pipeline`] if a preview render fails.
    pub async fn dispatch(&mut self, action: Action) -> Result<(), ComposerError> {
        let mut pending: VecDeque<Command> = self.state.reduce(action).into();
        while let Some(command) = pending.pop_front() {
            match command {
                Command::Recompose(slide) => self.recompose(slide).await?,
                Command::ClearPreview(slide) => self.clear_preview(slide),
                Command::Stage(job) => self.spawn_staging(job),
            }
        }
        Ok(())
    }

    /// Number of spawned staging attempts that have not finished.
    #[must_use]
    pub fn staging_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for the next event from a spawned staging attempt and
    /// dispatch it.
    ///
    /// Returns `false` without waiting when no attempt is running and no
    /// event is queued. Cancel-safe until an event has been received.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::Background`] if a staging task panicked,
    /// or [`ComposerError::Pipeline`] if the resulting render fails.
    pub async fn pump(&mut self) -> Result<bool, ComposerError> {
        loop {
            if let Ok(action) = self.inbox.try_recv() {
                self.dispatch(action).await?;
                return Ok(true);
            }
            if self.in_flight.is_empty() {
                return Ok(false);
            }
            let received = tokio::select! {
                Some(action) = self.inbox.recv() => Some(action),
                Some(joined) = self.in_flight.join_next() => {
                    joined?;
                    None
                }
                else => None,
            };
            if let Some(action) = received {
                self.dispatch(action).await?;
                return Ok(true);
            }
        }
    }

    /// Pump events until the current staging attempt has succeeded or
    /// failed.
    ///
    /// # Errors
    ///
    /// See [`Self::pump`].
    pub async fn settle(&mut self) -> Result<(), ComposerError> {
        while self.state.staging().is_busy() {
            if !self.pump().await? {
                break;
            }
        }
        Ok(())
    }

    /// Apply `action` without running its commands; the caller runs them.
    #[must_use]
    pub fn apply(&mut self, action: Action) -> Vec<Command> {
        self.state.reduce(action)
    }

    /// Start a staging attempt and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::StagingFailed`] when the attempt fails; the
    /// state stays retryable.
    pub async fn generate(&mut self) -> Result<(), ComposerError> {
        self.dispatch(Action::Generate).await?;
        self.settle().await?;
        match self.state.staging() {
            StagingPhase::Failed { request, reason } => Err(ComposerError::StagingFailed {
                request: *request,
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Both slides as JPEG, staging first if slide 2 has no base yet.
    ///
    /// An attempt already in flight is waited for first.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::StagingFailed`] if the implicit staging
    /// attempt fails, or [`ComposerError::Pipeline`] if a slide cannot be
    /// composed.
    pub async fn finalize(&mut self) -> Result<[Vec<u8>; 2], ComposerError> {
        self.settle().await?;
        if self.state.base(SlideId::Staged).is_none() {
            tracing::info!("slide 2 not staged yet, staging before finalize");
            self.generate().await?;
        }
        let mut out: [Vec<u8>; 2] = Default::default();
        for slide in SlideId::ALL {
            let base = self
                .state
                .base(slide)
                .cloned()
                .ok_or(PipelineError::NoSource)?;
            let view = self.state.view(slide);
            let quality = self.output_quality;
            out[slide.index()] = tokio::task::spawn_blocking(move || {
                compose(&base, view)?.encode_jpeg(quality)
            })
            .await??;
            tracing::debug!(%slide, bytes = out[slide.index()].len(), "finalized slide");
        }
        Ok(out)
    }

    /// Capture a render of `slide` from its current base and view.
    ///
    /// Issues a new ticket, so every earlier render of the slide becomes
    /// stale. Returns `None` when the slide has no base.
    pub fn begin_render(&mut self, slide: SlideId) -> Option<RenderJob> {
        let base = self.state.base(slide)?.clone();
        let ticket = self.previews[slide.index()].latest.issue();
        Some(RenderJob {
            slide,
            ticket,
            base,
            view: self.state.view(slide),
            quality: self.output_quality,
        })
    }

    /// Commit `rendered` if it is still the newest render of its slide.
    ///
    /// Returns whether it was accepted.
    pub fn commit(&mut self, rendered: Rendered) -> bool {
        let Rendered {
            slide,
            ticket,
            composition,
            jpeg,
        } = rendered;
        let preview = &mut self.previews[slide.index()];
        if !preview.latest.is_current(ticket) {
            tracing::debug!(%slide, ticket = ticket.get(), "dropping stale render");
            return false;
        }
        match preview.latest.commit(ticket, Arc::new(composition)) {
            Commit::Accepted { .. } => {
                preview.handle.replace(self.registry.create(jpeg, "image/jpeg"));
                tracing::trace!(%slide, ticket = ticket.get(), "preview committed");
                true
            }
            Commit::Stale(_) => false,
        }
    }

    /// Detach `job` into a task that owns everything it needs.
    ///
    /// The reducer must already have issued `job`; feed the actions the
    /// task produces back through [`Self::dispatch`] or [`Self::apply`].
    #[must_use]
    pub fn begin_staging(&self, job: StagingJob) -> StagingTask<B> {
        StagingTask {
            job,
            backend: Arc::clone(&self.backend),
            image_url: self.image_url.clone(),
            lang: self.lang.clone(),
            quality: self.output_quality,
        }
    }

    fn spawn_staging(&mut self, job: StagingJob) {
        let task = self.begin_staging(job);
        tracing::debug!(request = %task.request(), "spawning staging attempt");
        self.in_flight.spawn(task.run(self.events.clone()));
    }

    async fn recompose(&mut self, slide: SlideId) -> Result<(), ComposerError> {
        if let Some(job) = self.begin_render(slide) {
            let rendered = job.run().await?;
            self.commit(rendered);
        }
        Ok(())
    }

    fn clear_preview(&mut self, slide: SlideId) {
        let preview = &mut self.previews[slide.index()];
        // Invalidate in-flight renders too.
        preview.latest.issue();
        preview.latest.clear();
        preview.handle.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_pipeline::RgbaImage;

    use super::*;

    struct Unreachable;

    impl StagingBackend for Unreachable {
        async fn stage(&self, _request: StagingRequest) -> Result<String, StagingError> {
            Err(StagingError::Rejected {
                status: 503,
                message: "offline".into(),
            })
        }
    }

    fn source() -> SourceImage {
        let raster = RgbaImage::from_pixel(40, 50, image::Rgba([200, 30, 30, 255]));
        SourceImage::from_raster(raster, SourceOrigin::Picked)
    }

    async fn composer() -> CarouselComposer<Unreachable> {
        CarouselComposer::open(source(), Unreachable, HandleRegistry::new(), &Config::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_renders_slide_one_only() {
        let composer = composer().await;
        assert!(composer.preview(SlideId::Original).is_some());
        assert!(composer.preview(SlideId::Staged).is_none());
        assert_eq!(composer.registry().live_count(), 1);
    }

    #[tokio::test]
    async fn slide_two_cannot_render_without_base() {
        let mut composer = composer().await;
        assert!(composer.begin_render(SlideId::Staged).is_none());
    }

    #[tokio::test]
    async fn generate_failure_is_reported_and_retryable() {
        let mut composer = composer().await;
        let err = composer.generate().await.unwrap_err();
        assert!(matches!(err, ComposerError::StagingFailed { ref reason, .. } if reason == "offline"));
        assert_eq!(composer.state().active(), SlideId::Original);
        assert!(composer.state().base(SlideId::Staged).is_none());
        assert!(composer.generate().await.is_err());
    }

    #[tokio::test]
    async fn finalize_aborts_when_staging_fails() {
        let mut composer = composer().await;
        assert!(matches!(
            composer.finalize().await,
            Err(ComposerError::StagingFailed { .. })
        ));
    }

    #[tokio::test]
    async fn pump_without_staging_returns_immediately() {
        let mut composer = composer().await;
        assert_eq!(composer.staging_in_flight(), 0);
        assert!(!composer.pump().await.unwrap());
        composer.settle().await.unwrap();
    }

    #[tokio::test]
    async fn dispatching_generate_does_not_wait_for_the_backend() {
        let mut composer = composer().await;
        composer.dispatch(Action::Generate).await.unwrap();
        assert!(composer.state().staging().is_busy());
        assert_eq!(composer.staging_in_flight(), 1);
        composer.settle().await.unwrap();
        assert_eq!(composer.state().staging().error(), Some("offline"));
    }

    #[tokio::test]
    async fn stale_render_is_dropped() {
        let mut composer = composer().await;
        let old = composer.begin_render(SlideId::Original).unwrap();
        let new = composer.begin_render(SlideId::Original).unwrap();
        let new = new.run().await.unwrap();
        let old = old.run().await.unwrap();
        assert!(composer.commit(new));
        assert!(!composer.commit(old));
        assert_eq!(composer.registry().live_count(), 1);
    }
}
