//! Basic download example
//!
//! This example demonstrates the core functionality of hls-dl:
//! - Creating a downloader instance
//! - Subscribing to events
//! - Downloading an HLS stream and encoding it with ffmpeg
//!
//! Run with:
//!
//! ```text
//! RUST_LOG=hls_dl=debug cargo run --example basic_download -- <manifest-url> [output.mp4] [quality]
//! ```

use std::path::PathBuf;

use hls_dl::{Config, Event, HlsDownloader, QualityProfile, format_file_size};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or("usage: basic_download <manifest-url> [output.mp4] [quality]")?;
    let output = PathBuf::from(args.next().unwrap_or_else(|| "output.mp4".to_string()));

    // Load hls-dl.json if present, otherwise use defaults
    let config_path = PathBuf::from("hls-dl.json");
    let config = if config_path.exists() {
        Config::from_json_file(&config_path)?
    } else {
        Config::default()
    };
    let quality: QualityProfile = match args.next() {
        Some(name) => name.parse()?,
        None => config.encoder.quality,
    };

    let downloader = HlsDownloader::new(config)?;

    // Subscribe to events
    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::StreamSelected {
                    url,
                    index,
                    candidates,
                    ..
                } => {
                    println!("✓ Selected variant {}/{}: {}", index + 1, candidates, url);
                }
                Event::ManifestResolved {
                    segments,
                    total_duration,
                    ..
                } => {
                    println!("✓ {} segments, {:.1}s total", segments, total_duration);
                }
                Event::SegmentProgress {
                    completed,
                    failed,
                    total,
                    percent,
                    ..
                } => {
                    println!(
                        "⬇ {}/{} segments, {} failed ({:.1}%)",
                        completed, total, failed, percent
                    );
                }
                Event::SegmentFailed { index, error, .. } => {
                    println!("✗ Segment {} skipped: {}", index, error);
                }
                Event::EncodeStarted { output, .. } => {
                    println!("🎞 Encoding to {:?}", output);
                }
                Event::EncodeProgress {
                    percent: Some(percent),
                    ..
                } => {
                    println!("🎞 Encoding {:.0}%", percent);
                }
                Event::DownloadFailed { code, error, .. } => {
                    println!("✗ Failed ({}): {}", code, error);
                }
                _ => {}
            }
        }
    });

    let summary = downloader.info(&url).await?;
    println!(
        "Stream: {} segments, avg {:.2}s",
        summary.segment_count, summary.average_duration
    );

    let encoder = downloader.default_encoder()?;
    let outcome = downloader
        .download_and_encode(&url, &output, quality, &encoder)
        .await?;

    println!(
        "✓ Complete: {:?} ({}/{} segments, {})",
        outcome.output,
        outcome.downloaded_segments,
        outcome.total_segments,
        format_file_size(outcome.output_bytes)
    );
    println!(
        "  resolve {:.2}s, download {:.2}s ({:.2} segments/s), encode {:.2}s, total {:.2}s",
        outcome.resolve_elapsed.as_secs_f64(),
        outcome.download_elapsed.as_secs_f64(),
        outcome.segments_per_second(),
        outcome.encode_elapsed.as_secs_f64(),
        outcome.total_elapsed().as_secs_f64()
    );

    Ok(())
}
