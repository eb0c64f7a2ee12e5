//! Acquisition tool invocation.
//!
//! Runs the external download tool (spotdl by default) as a child process:
//! - arguments are passed as a list, never through a shell
//! - the working directory is the session workspace, set on the child only
//! - stdout/stderr are captured for diagnostics
//! - the child is killed once the configured timeout expires

use crate::config::AcquisitionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Bytes of stderr kept in a failure result
const STDERR_EXCERPT_BYTES: usize = 2000;

/// Audio codecs the tool can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Flac,
    Opus,
    Ogg,
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Opus => "opus",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
        }
    }

    /// File extension of produced artifacts, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options forwarded to the acquisition tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionOptions {
    #[serde(default)]
    pub format: AudioFormat,

    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Download threads used by the tool
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Lyrics source; `"none"` disables lyrics
    #[serde(default = "default_lyrics_provider")]
    pub lyrics_provider: Option<String>,
}

fn default_bitrate() -> String {
    "320k".to_string()
}

fn default_parallelism() -> u32 {
    12
}

fn default_lyrics_provider() -> Option<String> {
    Some("genius".to_string())
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            bitrate: default_bitrate(),
            parallelism: default_parallelism(),
            lyrics_provider: default_lyrics_provider(),
        }
    }
}

impl AcquisitionOptions {
    /// Effective lyrics provider, if any.
    pub fn lyrics_provider(&self) -> Option<&str> {
        self.lyrics_provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("none"))
    }
}

/// Check that a source URL uses an http(s) scheme.
pub fn is_valid_source_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Tool arguments for one download, after any configured leading arguments.
pub fn build_args(source_url: &str, options: &AcquisitionOptions) -> Vec<String> {
    let mut args = vec![
        "download".to_string(),
        source_url.to_string(),
        "--threads".to_string(),
        options.parallelism.to_string(),
        "--format".to_string(),
        options.format.as_str().to_string(),
        "--bitrate".to_string(),
        options.bitrate.clone(),
    ];

    if let Some(provider) = options.lyrics_provider() {
        args.push("--lyrics".to_string());
        args.push(provider.to_string());
    }

    args
}

/// Outcome of one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    /// The tool exited with status zero (it may still have produced nothing)
    Success,
    Failure(AcquisitionFailure),
}

impl AcquisitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionResult::Success)
    }
}

/// Why an acquisition run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionFailure {
    /// Rejected before any process was spawned
    InvalidUrl,
    /// The tool ran and exited non-zero (`None` when killed by a signal)
    Exited {
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },
    /// The tool exceeded its time budget and was killed
    TimedOut { after: Duration },
    /// The tool could not be started or waited on
    Spawn { reason: String },
}

impl fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionFailure::InvalidUrl => write!(f, "invalid URL"),
            AcquisitionFailure::Exited {
                exit_code,
                stderr_excerpt,
            } => match exit_code {
                Some(code) => write!(f, "exited with status {}: {}", code, stderr_excerpt),
                None => write!(f, "terminated by signal: {}", stderr_excerpt),
            },
            AcquisitionFailure::TimedOut { after } => {
                write!(f, "timed out after {}s", after.as_secs())
            }
            AcquisitionFailure::Spawn { reason } => write!(f, "could not run tool: {}", reason),
        }
    }
}

/// Fetches the audio behind a URL into a workspace.
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Run one acquisition. Never fails with an error; every problem is a
    /// [`AcquisitionResult::Failure`].
    async fn fetch(
        &self,
        workspace: &Path,
        source_url: &str,
        options: &AcquisitionOptions,
    ) -> AcquisitionResult;
}

/// [`Acquirer`] backed by an external program.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    program: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    /// Arguments placed before the download arguments (e.g. `-m spotdl`).
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build an invoker from the `[acquisition]` config section.
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(&config.program, config.timeout()).with_leading_args(config.program_args.clone())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Acquirer for ToolInvoker {
    async fn fetch(
        &self,
        workspace: &Path,
        source_url: &str,
        options: &AcquisitionOptions,
    ) -> AcquisitionResult {
        if !is_valid_source_url(source_url) {
            return AcquisitionResult::Failure(AcquisitionFailure::InvalidUrl);
        }

        let args = build_args(source_url, options);
        debug!(
            "Running {:?} {:?} {:?} in {:?}",
            self.program, self.leading_args, args, workspace
        );

        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {:?}: {}", self.program, e);
                return AcquisitionResult::Failure(AcquisitionFailure::Spawn {
                    reason: e.to_string(),
                });
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to wait on {:?}: {}", self.program, e);
                return AcquisitionResult::Failure(AcquisitionFailure::Spawn {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "Acquisition of {} timed out after {:?}, killed",
                    source_url, self.timeout
                );
                return AcquisitionResult::Failure(AcquisitionFailure::TimedOut {
                    after: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("Acquisition output: {}", stdout.trim());
        }

        if output.status.success() {
            info!("Acquisition of {} finished", source_url);
            AcquisitionResult::Success
        } else {
            let stderr_excerpt = tail_excerpt(&stderr, STDERR_EXCERPT_BYTES);
            warn!(
                "Acquisition of {} failed ({}): {}",
                source_url, output.status, stderr_excerpt
            );
            AcquisitionResult::Failure(AcquisitionFailure::Exited {
                exit_code: output.status.code(),
                stderr_excerpt,
            })
        }
    }
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail_excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
