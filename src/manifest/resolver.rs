//! Manifest resolution: follow master playlists until a media playlist is reached.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::manifest::parser::{Playlist, parse_playlist, select_variant_index};
use crate::transport::HttpTransport;
use crate::types::{SegmentDescriptor, StreamSummary};
use crate::url_resolver;

/// A manifest URL together with the directory URL its references resolve against.
///
/// Recomputed for every manifest fetched; a variant playlist never inherits
/// its master's base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestContext {
    /// The manifest's own URL
    pub manifest_url: String,
    /// Directory of `manifest_url`, with trailing slash
    pub base_url: String,
}

impl ManifestContext {
    /// Build the context for `manifest_url`
    pub fn new(manifest_url: &str) -> Result<Self> {
        Ok(Self {
            manifest_url: manifest_url.to_string(),
            base_url: url_resolver::base_url(manifest_url)?,
        })
    }
}

/// A variant chosen from a master playlist
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantSelection {
    /// The master playlist URL
    pub master_url: String,
    /// Absolute URL of the chosen variant
    pub url: String,
    /// Zero-based index among the listed variants
    pub index: usize,
    /// Number of variants listed
    pub candidates: usize,
}

/// Outcome of resolving a manifest URL
#[derive(Clone, Debug)]
pub struct ResolvedManifest {
    /// The media playlist the segments came from
    pub context: ManifestContext,
    /// Variants followed on the way, outermost first
    pub selections: Vec<VariantSelection>,
    /// Segments in playlist order, with absolute URLs
    pub segments: Vec<SegmentDescriptor>,
}

/// Fetches manifests and follows master playlists down to a media playlist.
pub struct ManifestResolver {
    transport: Arc<dyn HttpTransport>,
    max_depth: usize,
}

impl ManifestResolver {
    /// Create a resolver that fetches at most `max_depth` manifests per resolution
    pub fn new(transport: Arc<dyn HttpTransport>, max_depth: usize) -> Self {
        Self {
            transport,
            max_depth: max_depth.max(1),
        }
    }

    /// Resolve `url` to its ordered, absolute segment list
    pub async fn resolve(&self, url: &str) -> Result<Vec<SegmentDescriptor>> {
        Ok(self.resolve_manifest(url).await?.segments)
    }

    /// Resolve `url` and summarize the resulting media playlist
    pub async fn summarize(&self, url: &str) -> Result<StreamSummary> {
        let segments = self.resolve(url).await?;
        Ok(StreamSummary::from_segments(&segments))
    }

    /// Resolve `url`, keeping track of the variants followed.
    ///
    /// # Errors
    ///
    /// - [`Error::ManifestFetch`] if a manifest cannot be fetched (network failure, non-2xx)
    /// - [`Error::ManifestParse`] if a master lists no variants or the media playlist
    ///   has no segments
    /// - [`Error::ManifestRedirectLoop`] if a URL is revisited or more than `max_depth`
    ///   manifests would be fetched
    pub async fn resolve_manifest(&self, url: &str) -> Result<ResolvedManifest> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut selections = Vec::new();
        let mut current = url.to_string();

        loop {
            if visited.contains(&current) || visited.len() >= self.max_depth {
                return Err(Error::ManifestRedirectLoop {
                    url: current,
                    depth: visited.len(),
                });
            }
            visited.insert(current.clone());

            let context = ManifestContext::new(&current)?;
            tracing::debug!(
                url = %context.manifest_url,
                depth = visited.len(),
                "Fetching manifest"
            );
            let text = self.fetch(&context.manifest_url).await?;

            match parse_playlist(&text)? {
                Playlist::Master(variants) => {
                    let index = select_variant_index(variants.len());
                    let next = url_resolver::resolve(&context.base_url, &variants[index]);

                    tracing::info!(
                        master = %context.manifest_url,
                        variant = %next,
                        index = index,
                        candidates = variants.len(),
                        "Master playlist detected, selected variant"
                    );

                    selections.push(VariantSelection {
                        master_url: context.manifest_url,
                        url: next.clone(),
                        index,
                        candidates: variants.len(),
                    });
                    current = next;
                }
                Playlist::Media(segments) => {
                    if segments.is_empty() {
                        return Err(Error::ManifestParse(format!(
                            "media playlist {} contains no segments",
                            context.manifest_url
                        )));
                    }

                    let segments: Vec<SegmentDescriptor> = segments
                        .into_iter()
                        .map(|s| SegmentDescriptor {
                            duration: s.duration,
                            url: url_resolver::resolve(&context.base_url, &s.url),
                        })
                        .collect();

                    tracing::info!(
                        url = %context.manifest_url,
                        segments = segments.len(),
                        "Media playlist resolved"
                    );

                    return Ok(ResolvedManifest {
                        context,
                        selections,
                        segments,
                    });
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.transport
            .get_text(url)
            .await
            .map_err(|e| Error::ManifestFetch {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}
