//! Manifest handling -- parsing `.m3u8` text and resolving a URL to its segments.
//!
//! Split into focused submodules:
//! - [`parser`] - Master/media disambiguation and line-by-line parsing
//! - [`resolver`] - Fetch, parse, and follow master playlists to a media playlist

pub mod parser;
pub mod resolver;

pub use parser::{Playlist, is_master_playlist, parse_playlist, select_variant_index};
pub use resolver::{ManifestResolver, ResolvedManifest};
