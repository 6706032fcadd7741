//! atelier-pipeline: Pure image composition pipeline (sans-IO).
//!
//! Turns an artwork photo into Instagram-ready 4:5 slides:
//! decode -> compress -> compose (zoom/pan) -> normalize staged results,
//! plus the framed card layout and the carousel state reducer.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns rasters and encoded bytes. Storage, HTTP and
//! the async driver live in `atelier-io`.

pub mod blur;
pub mod card;
pub mod compose;
pub mod compress;
pub mod data_url;
pub mod decode;
pub mod geometry;
pub mod latest;
pub mod normalize;
pub mod raster;
pub mod scene;
pub mod session;
pub mod types;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use card::{Background, Border, CardAspect, CardOptions, Frame, compose_card};
pub use compose::{Composition, compose, compose_slide};
pub use compress::{CompressOptions, CompressOutcome, Compressed, ResampleFilter, compress};
pub use decode::{SourceImage, SourceOrigin, decode};
pub use latest::{Commit, LatestOnly, Ticket};
pub use normalize::{normalize, normalize_bytes, normalize_data_url};
pub use scene::{Scene, ScenePreset, combine_prompt};
pub use session::{
    Action, Command, ComposerState, RequestId, SlideId, StagingJob, StagingPhase,
};
pub use types::{CANVAS, Dimensions, PipelineError, Quality, Rgb, RgbaImage};
pub use view::ViewTransform;
