//! atelier-io: everything in the composer that touches the outside world.
//!
//! Configuration loading, the SQLite blob cache, display handles for
//! previews, the staging HTTP client, image reference resolution, and the
//! async [`CarouselComposer`] that drives the pure state machine from
//! `atelier-pipeline`.

pub mod api;
pub mod cache;
pub mod composer;
pub mod config;
pub mod display;
pub mod source;
pub mod staging;

pub use api::ApiClient;
pub use cache::{BlobCache, CacheError, CacheKey};
pub use composer::{CarouselComposer, ComposerError, RenderJob, Rendered, StagingTask};
pub use config::{Config, ConfigError};
pub use display::{DisplayHandle, HandleRegistry, HandleSlot};
pub use source::{Displayable, FetchError, ImageFetcher, ImageRef, Resolved, SourceError};
pub use staging::{StagingBackend, StagingError, StagingRequest};
