/*!
 * Playback-rate post-processing for synthesized clips.
 *
 * The tempo change itself is delegated to a `TempoTransform`; the default
 * one shells out to ffmpeg's `atempo` filter. `AudioPostProcessor` owns the
 * temp-file-then-rename dance so a failed transform never damages a clip.
 */

use async_trait::async_trait;
use log::{debug, error};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::AudioError;

/// Slowest supported playback rate
pub const MIN_RATE: f64 = 0.5;
/// Fastest supported playback rate
pub const MAX_RATE: f64 = 2.0;

/// Rates this close to 1.0 leave clips untouched
const RATE_EPSILON: f64 = 1e-6;

/// Whether applying `rate` would change a clip
pub fn rate_needs_adjustment(rate: f64) -> bool {
    (rate - 1.0).abs() > RATE_EPSILON
}

/// Something that can re-time an audio file
#[async_trait]
pub trait TempoTransform: Send + Sync + std::fmt::Debug {
    /// Read `input`, write a copy played at `rate` to `output`
    async fn apply(&self, input: &Path, output: &Path, rate: f64) -> Result<(), AudioError>;
}

/// ffmpeg `atempo` transform
#[derive(Debug, Clone)]
pub struct FfmpegTempo {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for FfmpegTempo {
    fn default() -> Self {
        Self::with_binary("ffmpeg")
    }
}

impl FfmpegTempo {
    /// Use a specific ffmpeg executable
    pub fn with_binary<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Give up on ffmpeg after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // Last non-empty stderr line carries the error
    fn filter_stderr(stderr: &str) -> String {
        let lines: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        lines.last().map(|line| line.to_string()).unwrap_or_default()
    }
}

#[async_trait]
impl TempoTransform for FfmpegTempo {
    async fn apply(&self, input: &Path, output: &Path, rate: f64) -> Result<(), AudioError> {
        let filter = format!("atempo={}", rate);
        let tool = self.binary.display().to_string();

        let ffmpeg_future = Command::new(&self.binary)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-filter:a", filter.as_str()])
            .arg(output)
            .kill_on_drop(true)
            .output();

        let result = tokio::select! {
            result = ffmpeg_future => {
                result.map_err(|e| AudioError::ToolMissing { tool: tool.clone(), reason: e.to_string() })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(AudioError::TransformFailed(format!(
                    "{} timed out after {:?}", tool, self.timeout
                )));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AudioError::TransformFailed(format!(
                "{} exited with {}: {}",
                tool,
                result.status,
                Self::filter_stderr(&stderr)
            )));
        }

        Ok(())
    }
}

/// Applies playback-rate changes to clips in place
#[derive(Debug, Clone)]
pub struct AudioPostProcessor {
    transform: Arc<dyn TempoTransform>,
}

impl Default for AudioPostProcessor {
    fn default() -> Self {
        Self::new(Arc::new(FfmpegTempo::default()))
    }
}

impl AudioPostProcessor {
    pub fn new(transform: Arc<dyn TempoTransform>) -> Self {
        Self { transform }
    }

    /// Write `input` re-timed by `rate` to `output`
    pub async fn adjust(&self, input: &Path, output: &Path, rate: f64) -> Result<(), AudioError> {
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            return Err(AudioError::InvalidRate(rate));
        }
        self.transform.apply(input, output, rate).await
    }

    /// Re-time `clip` in place. On failure the original clip is left as it was.
    pub async fn adjust_in_place(&self, clip: &Path, rate: f64) -> Result<(), AudioError> {
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            return Err(AudioError::InvalidRate(rate));
        }

        let dir = match clip.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = clip
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        // Dropping the temp file on an early return removes it
        let temp = tempfile::Builder::new()
            .prefix(".tempo-")
            .suffix(&suffix)
            .tempfile_in(&dir)?;

        if let Err(e) = self.transform.apply(clip, temp.path(), rate).await {
            error!("Playback-rate change failed for {}: {}", clip.display(), e);
            return Err(e);
        }

        temp.persist(clip).map_err(|e| AudioError::Io(e.error))?;
        debug!("Applied playback rate {} to {}", rate, clip.display());
        Ok(())
    }
}
