//! `.m3u8` text parsing.
//!
//! A manifest is either a master playlist (a list of variant playlists) or a
//! media playlist (an ordered list of segments). Only the handful of tags the
//! downloader needs are interpreted; everything else starting with `#` is
//! skipped.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::SegmentDescriptor;

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const MEDIA_TAG: &str = "#EXT-X-MEDIA";
const AUDIO_TYPE_ATTR: &str = "TYPE=AUDIO";
const EXTINF_PREFIX: &str = "#EXTINF:";
const PLAYLIST_EXTENSION: &str = ".m3u8";

/// Highest variant index the selection heuristic will pick
const PREFERRED_VARIANT_INDEX: usize = 3;

#[allow(clippy::unwrap_used)]
static EXTINF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXTINF:([\d.]+)").unwrap());

/// Parsed manifest
#[derive(Clone, Debug, PartialEq)]
pub enum Playlist {
    /// Variant playlist references, in manifest order, unresolved
    Master(Vec<String>),
    /// Segments in manifest order, URLs unresolved
    Media(Vec<SegmentDescriptor>),
}

/// Whether `text` is a master playlist.
///
/// True iff some line carries `#EXT-X-STREAM-INF`, or an `#EXT-X-MEDIA` tag
/// declaring an audio rendition.
pub fn is_master_playlist(text: &str) -> bool {
    text.lines().any(|line| {
        line.contains(STREAM_INF_TAG)
            || (line.contains(MEDIA_TAG) && line.contains(AUDIO_TYPE_ATTR))
    })
}

/// Parse manifest text.
///
/// Fails with [`Error::ManifestParse`] when a master playlist lists no
/// variant playlists. A media playlist without segments parses to an empty
/// list; the resolver decides whether that is fatal.
pub fn parse_playlist(text: &str) -> Result<Playlist> {
    if is_master_playlist(text) {
        let variants = parse_master(text);
        if variants.is_empty() {
            return Err(Error::ManifestParse(
                "master playlist lists no stream URLs".to_string(),
            ));
        }
        Ok(Playlist::Master(variants))
    } else {
        Ok(Playlist::Media(parse_media(text)))
    }
}

/// Index of the variant to download out of `count` candidates.
///
/// Positional: the 4th entry, or the last one when fewer are listed.
/// `BANDWIDTH`/`RESOLUTION` attributes are not consulted.
pub fn select_variant_index(count: usize) -> usize {
    PREFERRED_VARIANT_INDEX.min(count.saturating_sub(1))
}

fn parse_master(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| line.ends_with(PLAYLIST_EXTENSION))
        .map(str::to_string)
        .collect()
}

fn parse_media(text: &str) -> Vec<SegmentDescriptor> {
    let mut segments = Vec::new();
    let mut pending_duration: Option<f64> = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF_PREFIX) {
            pending_duration = parse_extinf(line);
            if pending_duration.is_none() {
                tracing::warn!(
                    line = line_no + 1,
                    tag = line,
                    "Ignoring #EXTINF without a positive duration"
                );
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        match pending_duration.take() {
            Some(duration) => segments.push(SegmentDescriptor {
                duration,
                url: line.to_string(),
            }),
            None => {
                tracing::debug!(
                    line = line_no + 1,
                    uri = line,
                    "Dropping segment URI with no preceding #EXTINF"
                );
            }
        }
    }

    segments
}

fn parse_extinf(line: &str) -> Option<f64> {
    EXTINF_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
