//! Base-URL computation and relative reference resolution for manifests.
//!
//! A reference that already carries an `http`/`https` scheme is used as-is.
//! Anything else is appended to the manifest's directory URL. `../` segments
//! are **not** normalized; playlists are expected to reference files in (or
//! below) their own directory.

use crate::error::{Error, Result};
use url::{Position, Url};

/// Directory URL of `manifest_url`, ending in `/`.
///
/// `http://cdn.example.com:8080/live/master.m3u8?token=1` becomes
/// `http://cdn.example.com:8080/live/`. The query and fragment are dropped.
pub fn base_url(manifest_url: &str) -> Result<String> {
    let parsed = Url::parse(manifest_url).map_err(|e| Error::InvalidUrl {
        url: manifest_url.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(Error::InvalidUrl {
            url: manifest_url.to_string(),
            reason: "URL has no host".to_string(),
        });
    }

    let origin = &parsed[..Position::BeforePath];
    let path = parsed.path();
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };

    Ok(format!("{origin}{dir}"))
}

/// Resolve `reference` against `base_url`.
///
/// Absolute references (starting with `http`) are returned unchanged, so
/// resolving an already-resolved URL is a no-op.
pub fn resolve(base_url: &str, reference: &str) -> String {
    if has_scheme(reference) {
        reference.to_string()
    } else {
        format!("{base_url}{reference}")
    }
}

fn has_scheme(reference: &str) -> bool {
    reference.starts_with("http")
}
