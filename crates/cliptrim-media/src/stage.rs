//! External stage execution.
//!
//! A stage is one invocation of an external tool. [`StageRunner`] is the seam
//! the orchestrator depends on; [`ProcessStageRunner`] runs real subprocesses
//! and tests substitute scripted runners.

use std::fmt;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// First `<number>%` token in a chunk of tool output.
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent regex"));

/// Longest output chunk forwarded; longer runs without a line break are
/// dropped.
const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Default number of diagnostic characters kept from a failed stage.
pub const DEFAULT_TAIL_CHARS: usize = 400;

/// Pipeline stage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Remote media download (yt-dlp)
    Fetch,
    /// Time-window extraction and re-encode (FFmpeg)
    Cut,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "download",
            Stage::Cut => "trim",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-built tool invocation. Arguments are passed as an argv list and
/// never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(stage: Stage, program: impl Into<String>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Observation made while a stage is running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageEvent {
    /// Output chunk carried a percentage token (raw, 0-100)
    Progress(f64),
    /// Output chunk without a percentage; proof of life
    Activity,
}

/// Outcome of a stage that ran to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Bounded tail of the diagnostic stream
    pub stderr_tail: String,
}

impl StageResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into [`MediaError::StageFailed`].
    pub fn ensure_success(self, stage: Stage) -> MediaResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(MediaError::stage_failed(stage, self.exit_code, self.stderr_tail))
        }
    }
}

/// Capability to run an external stage and observe its output as it arrives.
///
/// `on_event` is invoked once per output chunk, in arrival order, from the
/// task that awaits `run`.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(
        &self,
        command: &StageCommand,
        on_event: &mut (dyn FnMut(StageEvent) + Send),
    ) -> MediaResult<StageResult>;
}

/// Extract the first percentage token from a chunk of tool output.
///
/// Values above 100 are clamped.
pub fn extract_percent(chunk: &str) -> Option<f64> {
    PERCENT
        .captures(chunk)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
}

fn classify_chunk(chunk: &str) -> StageEvent {
    extract_percent(chunk)
        .map(StageEvent::Progress)
        .unwrap_or(StageEvent::Activity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    Stdout,
    Stderr,
}

/// Keeps the last `max_chars` characters pushed into it.
#[derive(Debug)]
struct OutputTail {
    buf: String,
    max_chars: usize,
}

impl OutputTail {
    fn new(max_chars: usize) -> Self {
        Self {
            buf: String::new(),
            max_chars,
        }
    }

    fn push(&mut self, line: &str) {
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        self.buf.push_str(line);

        let count = self.buf.chars().count();
        if count > self.max_chars {
            let cut = self
                .buf
                .char_indices()
                .nth(count - self.max_chars)
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.buf.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.buf.trim().to_string()
    }
}

fn chunk_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), b"\n".to_vec(), MAX_CHUNK_BYTES)
}

/// Read a pipe and forward every `\r`- or `\n`-terminated chunk.
///
/// Progress bars redraw with carriage returns, so both count as boundaries.
/// The pipe is read to EOF even past an oversized chunk so the tool never
/// blocks on a full pipe.
async fn forward_chunks<R>(reader: R, source: OutputSource, tx: mpsc::UnboundedSender<(OutputSource, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, chunk_codec());

    loop {
        let mut oversized = false;

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => {
                    let chunk = String::from_utf8_lossy(&bytes).trim().to_string();
                    if !chunk.is_empty() && tx.send((source, chunk)).is_err() {
                        return;
                    }
                }
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    debug!("Dropping stage output chunk over {} bytes", MAX_CHUNK_BYTES);
                    oversized = true;
                }
                Err(AnyDelimiterCodecError::Io(e)) => {
                    debug!("Stage output read ended: {}", e);
                    return;
                }
            }
        }

        // A decode error ends the frame stream before EOF; resume on the pipe.
        if !oversized {
            return;
        }
        frames = FramedRead::new(frames.into_inner(), chunk_codec());
    }
}

/// Runs stages as child processes.
#[derive(Debug, Clone)]
pub struct ProcessStageRunner {
    timeout: Option<Duration>,
    tail_chars: usize,
}

impl Default for ProcessStageRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStageRunner {
    pub fn new() -> Self {
        Self {
            timeout: None,
            tail_chars: DEFAULT_TAIL_CHARS,
        }
    }

    /// Kill the child and fail with [`MediaError::Timeout`] after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_tail_chars(mut self, tail_chars: usize) -> Self {
        self.tail_chars = tail_chars.max(1);
        self
    }
}

#[async_trait]
impl StageRunner for ProcessStageRunner {
    async fn run(
        &self,
        command: &StageCommand,
        on_event: &mut (dyn FnMut(StageEvent) + Send),
    ) -> MediaResult<StageResult> {
        debug!(stage = %command.stage, "Running: {} {}", command.program, command.args.join(" "));

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::stage_spawn(command.stage, command.program.clone(), e))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_chunks(stdout, OutputSource::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_chunks(stderr, OutputSource::Stderr, tx.clone()));
        }
        drop(tx);

        let mut stderr_tail = OutputTail::new(self.tail_chars);
        let mut stdout_tail = OutputTail::new(self.tail_chars);

        let consume = async {
            while let Some((source, chunk)) = rx.recv().await {
                match source {
                    OutputSource::Stderr => stderr_tail.push(&chunk),
                    OutputSource::Stdout => stdout_tail.push(&chunk),
                }
                on_event(classify_chunk(&chunk));
            }
            child.wait().await
        };

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, consume).await.ok(),
            None => Some(consume.await),
        };

        let status = match waited {
            Some(status) => status?,
            None => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!(stage = %command.stage, "Stage exceeded {}s, killing", secs);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out stage: {}", e);
                }
                return Err(MediaError::Timeout {
                    stage: command.stage,
                    secs,
                });
            }
        };

        // Some tools report fatal errors on stdout only.
        let stderr_tail = match stderr_tail.into_string() {
            tail if tail.is_empty() => stdout_tail.into_string(),
            tail => tail,
        };

        debug!(stage = %command.stage, exit_code = ?status.code(), "Stage exited");

        Ok(StageResult {
            exit_code: status.code(),
            stderr_tail,
        })
    }
}
