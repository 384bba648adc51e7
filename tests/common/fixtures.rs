//! Playlist fixtures and downloader setup against a wiremock server

use std::path::Path;
use std::time::Duration;

use hls_dl::{Config, HlsDownloader};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Media playlist listing `durations.len()` segments named `seg{i}.ts`
pub fn media_playlist(durations: &[f64]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
    for (i, duration) in durations.iter().enumerate() {
        text.push_str(&format!("#EXTINF:{duration:.1},\nseg{i}.ts\n"));
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

/// Master playlist listing `count` variants at `v{i}/index.m3u8`, lowest bandwidth first
pub fn master_playlist(count: usize) -> String {
    let mut text = String::from("#EXTM3U\n");
    for i in 0..count {
        text.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION=1280x720\nv{i}/index.m3u8\n",
            (i + 1) * 800_000
        ));
    }
    text
}

/// Body served for segment `i`
pub fn segment_body(i: usize) -> Vec<u8> {
    format!("segment-{i}-payload").into_bytes()
}

/// Serve `body` with status 200 at `url_path`
pub async fn serve(server: &MockServer, url_path: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Serve `status` at `url_path`
pub async fn serve_status(server: &MockServer, url_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve a media playlist at `{dir}/index.m3u8` and its segments at `{dir}/seg{i}.ts`
pub async fn serve_media(server: &MockServer, dir: &str, durations: &[f64]) {
    serve(server, &format!("{dir}/index.m3u8"), media_playlist(durations)).await;
    for i in 0..durations.len() {
        serve(server, &format!("{dir}/seg{i}.ts"), segment_body(i)).await;
    }
}

/// Config with short retry delays and staging under `temp`
pub fn test_config(temp: &Path) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = temp.to_path_buf();
    config.download.timeout = Duration::from_secs(5);
    config.retry.retry_attempts = 3;
    config.retry.base_delay = Duration::from_millis(10);
    config
}

/// Downloader using the real reqwest transport
pub fn test_downloader(config: Config) -> HlsDownloader {
    HlsDownloader::new(config).unwrap()
}

/// Number of entries in `dir`, or zero if it does not exist
pub fn entries_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
