//! Resolving image references to bytes, display handles or plain URLs.
//!
//! An artwork image is either a cache key (with the public URL it was
//! uploaded to, if any) or just a URL. Resolution prefers the cache and
//! degrades to the URL whenever the cache is unavailable or misses.

use std::future::Future;

use atelier_pipeline::{PipelineError, SourceImage, SourceOrigin};

use crate::cache::{BlobCache, CacheKey};
use crate::display::{DisplayHandle, HandleRegistry};

/// Errors fetching remote images.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// HTTP status.
        status: u16,
        /// URL requested.
        url: String,
    },

    /// A `data:` URL was malformed.
    #[error(transparent)]
    DataUrl(#[from] PipelineError),
}

/// Something that can download image bytes.
pub trait ImageFetcher: Send + Sync {
    /// Fetch the bytes at `url`.
    fn fetch_image(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Errors loading a [`SourceImage`] from an [`ImageRef`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The key is not cached and there is no URL to fall back to.
    #[error("image {0} is not cached and has no fallback URL")]
    NotFound(CacheKey),

    /// Fetching the fallback URL failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The bytes are not a decodable image.
    #[error(transparent)]
    Image(#[from] PipelineError),

    /// The decode task panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

/// Where an image can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Cached locally, optionally also published at a URL.
    Cached {
        /// Cache key.
        key: CacheKey,
        /// Public URL used when the cache cannot serve the key.
        fallback_url: Option<String>,
    },
    /// Only available remotely.
    Url(String),
}

/// Result of [`ImageRef::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Served from the cache.
    Bytes {
        /// Cached bytes.
        bytes: Vec<u8>,
        /// Key they were stored under.
        key: CacheKey,
    },
    /// Use this URL instead.
    Url(String),
}

/// Result of [`ImageRef::displayable`].
#[derive(Debug)]
pub enum Displayable {
    /// A live handle over cached bytes.
    Handle(DisplayHandle),
    /// A plain URL.
    Url(String),
}

impl Displayable {
    /// URL to show.
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Self::Handle(handle) => handle.url(),
            Self::Url(url) => url.clone(),
        }
    }
}

impl ImageRef {
    /// Look the reference up, preferring the cache.
    ///
    /// `cache` is `None` when the store could not be opened; that and any
    /// read error degrade to the fallback URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when a cached reference misses
    /// and has no fallback URL.
    pub async fn resolve(&self, cache: Option<&BlobCache>) -> Result<Resolved, SourceError> {
        let (key, fallback_url) = match self {
            Self::Url(url) => return Ok(Resolved::Url(url.clone())),
            Self::Cached { key, fallback_url } => (key, fallback_url),
        };

        let hit = match cache {
            Some(cache) => match cache.get(key).await {
                Ok(hit) => hit,
                Err(err) => {
                    tracing::warn!(%key, %err, "cache read failed, falling back to URL");
                    None
                }
            },
            None => {
                tracing::debug!(%key, "cache unavailable, falling back to URL");
                None
            }
        };

        match (hit, fallback_url) {
            (Some(bytes), _) => Ok(Resolved::Bytes {
                bytes,
                key: key.clone(),
            }),
            (None, Some(url)) => Ok(Resolved::Url(url.clone())),
            (None, None) => Err(SourceError::NotFound(key.clone())),
        }
    }

    /// Resolve to something displayable: a handle over cached bytes,
    /// otherwise the URL.
    ///
    /// # Errors
    ///
    /// As [`ImageRef::resolve`].
    pub async fn displayable(
        &self,
        cache: Option<&BlobCache>,
        registry: &HandleRegistry,
    ) -> Result<Displayable, SourceError> {
        Ok(match self.resolve(cache).await? {
            Resolved::Bytes { bytes, .. } => {
                let mime = sniff_mime(&bytes);
                Displayable::Handle(registry.create(bytes, mime))
            }
            Resolved::Url(url) => Displayable::Url(url),
        })
    }

    /// Resolve and decode into a [`SourceImage`], downloading if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`], [`SourceError::Fetch`] or
    /// [`SourceError::Image`].
    pub async fn load(
        &self,
        cache: Option<&BlobCache>,
        fetcher: &impl ImageFetcher,
    ) -> Result<SourceImage, SourceError> {
        let (bytes, origin) = match self.resolve(cache).await? {
            Resolved::Bytes { bytes, key } => (bytes, SourceOrigin::Cached(key.to_string())),
            Resolved::Url(url) => (fetcher.fetch_image(&url).await?, SourceOrigin::Url(url)),
        };
        let source =
            tokio::task::spawn_blocking(move || SourceImage::decode(&bytes, origin)).await??;
        Ok(source)
    }
}

/// Best-effort MIME type from magic bytes.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct NoNetwork;

    impl ImageFetcher for NoNetwork {
        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status {
                status: 404,
                url: url.to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn url_refs_resolve_to_themselves() {
        let r = ImageRef::Url("https://cdn.example/a.jpg".into());
        assert_eq!(
            r.resolve(None).await.unwrap(),
            Resolved::Url("https://cdn.example/a.jpg".into())
        );
    }

    #[tokio::test]
    async fn cache_hit_wins() {
        let cache = BlobCache::open_in_memory().unwrap();
        let key = cache.store(vec![7, 7]).await.unwrap();
        let r = ImageRef::Cached {
            key: key.clone(),
            fallback_url: Some("https://cdn.example/a.jpg".into()),
        };
        assert_eq!(
            r.resolve(Some(&cache)).await.unwrap(),
            Resolved::Bytes {
                bytes: vec![7, 7],
                key
            }
        );
    }

    #[tokio::test]
    async fn unavailable_cache_falls_back_to_url() {
        let r = ImageRef::Cached {
            key: CacheKey::from("k"),
            fallback_url: Some("https://cdn.example/a.jpg".into()),
        };
        assert_eq!(
            r.resolve(None).await.unwrap(),
            Resolved::Url("https://cdn.example/a.jpg".into())
        );
    }

    #[tokio::test]
    async fn miss_without_fallback_is_not_found() {
        let cache = BlobCache::open_in_memory().unwrap();
        let r = ImageRef::Cached {
            key: CacheKey::from("gone"),
            fallback_url: None,
        };
        assert!(matches!(
            r.resolve(Some(&cache)).await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn displayable_creates_a_handle_for_hits() {
        let cache = BlobCache::open_in_memory().unwrap();
        let registry = HandleRegistry::new();
        let key = cache.store(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]).await.unwrap();
        let r = ImageRef::Cached {
            key,
            fallback_url: None,
        };
        let shown = r.displayable(Some(&cache), &registry).await.unwrap();
        assert!(shown.url().starts_with("blob:atelier/"));
        assert_eq!(registry.live_count(), 1);
        drop(shown);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn load_surfaces_fetch_errors() {
        let r = ImageRef::Url("https://cdn.example/missing.jpg".into());
        assert!(matches!(
            r.load(None, &NoNetwork).await,
            Err(SourceError::Fetch(FetchError::Status { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn load_reports_undecodable_cache_entries() {
        let cache = BlobCache::open_in_memory().unwrap();
        let key = cache.store(b"not an image".to_vec()).await.unwrap();
        let r = ImageRef::Cached {
            key,
            fallback_url: None,
        };
        assert!(matches!(
            r.load(Some(&cache), &NoNetwork).await,
            Err(SourceError::Image(PipelineError::ImageDecode(_)))
        ));
    }
}
