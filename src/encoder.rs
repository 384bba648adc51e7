//! Encoding of staged segments into a single output file.
//!
//! The [`Encoder`] trait is the seam between the downloader and the external
//! transcoder. [`FfmpegEncoder`] drives the `ffmpeg` binary through its concat
//! demuxer and reads its `-progress` output to report [`EncodeProgress`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::config::EncoderConfig;
use crate::error::{Error, Result};

/// Named output quality
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    /// 854x480 at 25 fps
    Low,
    /// 1280x720 at 30 fps
    #[default]
    Medium,
    /// 1920x1080 at 30 fps
    High,
    /// 1920x1080 at 60 fps, high bitrate
    Best,
}

/// Concrete encoder parameters for a [`QualityProfile`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Video codec name
    pub video_codec: &'static str,
    /// Audio codec name
    pub audio_codec: &'static str,
    /// Video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Output frame rate
    pub fps: u32,
}

impl QualityProfile {
    /// All profiles, lowest first
    pub const ALL: [QualityProfile; 4] = [
        QualityProfile::Low,
        QualityProfile::Medium,
        QualityProfile::High,
        QualityProfile::Best,
    ];

    /// Encoder parameters for this profile
    pub fn settings(self) -> EncoderSettings {
        let (video_bitrate_kbps, audio_bitrate_kbps, width, height, fps) = match self {
            QualityProfile::Low => (800, 96, 854, 480, 25),
            QualityProfile::Medium => (2000, 128, 1280, 720, 30),
            QualityProfile::High => (4000, 192, 1920, 1080, 30),
            QualityProfile::Best => (8000, 256, 1920, 1080, 60),
        };
        EncoderSettings {
            video_codec: "libx264",
            audio_codec: "aac",
            video_bitrate_kbps,
            audio_bitrate_kbps,
            width,
            height,
            fps,
        }
    }

    /// Lowercase profile name
    pub fn as_str(self) -> &'static str {
        match self {
            QualityProfile::Low => "low",
            QualityProfile::Medium => "medium",
            QualityProfile::High => "high",
            QualityProfile::Best => "best",
        }
    }
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityProfile::Low),
            "medium" => Ok(QualityProfile::Medium),
            "high" => Ok(QualityProfile::High),
            "best" => Ok(QualityProfile::Best),
            other => Err(Error::Config {
                message: format!(
                    "unknown quality profile '{other}' (expected low, medium, high or best)"
                ),
                key: Some("quality".to_string()),
            }),
        }
    }
}

/// Progress reported while encoding
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodeProgress {
    /// Media time written to the output so far
    pub out_time: Duration,
    /// Share of the stream encoded (0.0 to 100.0), when the total duration is known
    pub percent: Option<f32>,
}

impl EncodeProgress {
    /// Progress at `out_time` of a stream lasting `total_duration` seconds
    pub fn new(out_time: Duration, total_duration: f64) -> Self {
        let percent = (total_duration > 0.0).then(|| {
            let ratio = out_time.as_secs_f64() / total_duration;
            (ratio * 100.0).clamp(0.0, 100.0) as f32
        });
        Self { out_time, percent }
    }
}

/// Turns a concat list of staged segments into one output file
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode the segments listed in `concat_list` into `output`, returning the output path
    async fn encode(
        &self,
        concat_list: &Path,
        output: &Path,
        quality: QualityProfile,
    ) -> Result<PathBuf>;

    /// Like [`encode`](Self::encode), reporting progress against a stream
    /// lasting `total_duration` seconds.
    ///
    /// The default implementation reports nothing.
    async fn encode_with_progress(
        &self,
        concat_list: &Path,
        output: &Path,
        quality: QualityProfile,
        total_duration: f64,
        on_progress: &(dyn Fn(EncodeProgress) + Send + Sync),
    ) -> Result<PathBuf> {
        let _ = (total_duration, on_progress);
        self.encode(concat_list, output, quality).await
    }

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Media time from one line of ffmpeg's `-progress` output.
///
/// Both `out_time_us` and `out_time_ms` carry microseconds. Other keys and
/// `N/A` values yield `None`.
pub fn parse_progress_line(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<u64>().ok().map(Duration::from_micros),
        _ => None,
    }
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", (value * 100.0).round() / 100.0, UNITS[unit])
}

/// [`Encoder`] backed by the external `ffmpeg` binary
///
/// # Examples
///
/// ```no_run
/// use hls_dl::{Encoder, FfmpegEncoder, QualityProfile};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let encoder = FfmpegEncoder::from_path().ok_or("ffmpeg not found in PATH")?;
/// let output = encoder
///     .encode(Path::new("temp/concat.txt"), Path::new("out.mp4"), QualityProfile::High)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct FfmpegEncoder {
    binary_path: PathBuf,
}

impl FfmpegEncoder {
    /// Create an encoder with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Find `ffmpeg` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Use the configured binary, or search PATH when none is configured
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] if no path is configured and `ffmpeg` is not in PATH.
    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        match &config.ffmpeg_path {
            Some(path) => Ok(Self::new(path.clone())),
            None => Self::from_path()
                .ok_or_else(|| Error::NotSupported("ffmpeg binary not found in PATH".to_string())),
        }
    }

    /// The binary this encoder runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command-line arguments for one encode
    pub fn build_args(concat_list: &Path, output: &Path, quality: QualityProfile) -> Vec<String> {
        let s = quality.settings();
        vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            concat_list.to_string_lossy().into_owned(),
            "-c:v".into(),
            s.video_codec.into(),
            "-c:a".into(),
            s.audio_codec.into(),
            "-b:v".into(),
            format!("{}k", s.video_bitrate_kbps),
            "-b:a".into(),
            format!("{}k", s.audio_bitrate_kbps),
            "-s".into(),
            format!("{}x{}", s.width, s.height),
            "-r".into(),
            s.fps.to_string(),
            "-movflags".into(),
            "+faststart".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            output.to_string_lossy().into_owned(),
        ]
    }

    async fn run(
        &self,
        concat_list: &Path,
        output: &Path,
        quality: QualityProfile,
        total_duration: f64,
        on_progress: Option<&(dyn Fn(EncodeProgress) + Send + Sync)>,
    ) -> Result<PathBuf> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!(
            input = ?concat_list,
            output = ?output,
            quality = %quality,
            "Starting ffmpeg encode"
        );

        let mut child = Command::new(&self.binary_path)
            .args(Self::build_args(concat_list, output, quality))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encode(format!("Failed to execute ffmpeg: {}", e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                stderr.read_to_string(&mut text).await.ok();
                text
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_percent: Option<u32> = None;
            while let Some(line) = lines.next_line().await? {
                let Some(out_time) = parse_progress_line(&line) else {
                    continue;
                };
                let progress = EncodeProgress::new(out_time, total_duration);
                // Whole-percent steps only
                if let Some(percent) = progress.percent {
                    let whole = percent.round() as u32;
                    if last_percent.is_some_and(|last| whole <= last) {
                        continue;
                    }
                    last_percent = Some(whole);
                    tracing::debug!(percent = whole, "Encode progress");
                }
                if let Some(on_progress) = on_progress {
                    on_progress(progress);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(Error::Encode(format!(
                "ffmpeg exited with {}: {}",
                status,
                tail.join(" | ")
            )));
        }

        tracing::info!(output = ?output, "Encode complete");
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        concat_list: &Path,
        output: &Path,
        quality: QualityProfile,
    ) -> Result<PathBuf> {
        self.run(concat_list, output, quality, 0.0, None).await
    }

    async fn encode_with_progress(
        &self,
        concat_list: &Path,
        output: &Path,
        quality: QualityProfile,
        total_duration: f64,
        on_progress: &(dyn Fn(EncodeProgress) + Send + Sync),
    ) -> Result<PathBuf> {
        self.run(
            concat_list,
            output,
            quality,
            total_duration,
            Some(on_progress),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
