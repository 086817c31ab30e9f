//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Lines of diagnostic stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Read the input as an ffconcat list of files.
    pub fn concat_demuxer(self) -> Self {
        self.input_args(["-f", "concat", "-safe", "0"])
    }

    /// Copy every stream without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Set still-image quality on the `-q:v` scale (2 is best).
    pub fn image_quality(self, q: u8) -> Self {
        self.output_arg("-q:v").output_arg(q.clamp(2, 31).to_string())
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, cancellation and timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that resolves `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Use an already-resolved binary path.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr).lines();
        let diagnostics = Arc::new(Mutex::new(Vec::<String>::new()));
        let tail = Arc::clone(&diagnostics);

        let progress_handle = tokio::spawn(async move {
            let mut current_progress = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current_progress) {
                    ParsedLine::Progress(progress) => progress_callback(progress),
                    ParsedLine::Field => {}
                    ParsedLine::Diagnostic => {
                        let mut lines = tail.lock().await;
                        if lines.len() == STDERR_TAIL_LINES {
                            lines.remove(0);
                        }
                        lines.push(line);
                    }
                }
            }
        });

        let result = self.wait_for_completion(&mut child).await;

        let _ = progress_handle.await;

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => {
                let stderr = diagnostics.lock().await.join("\n");
                Err(MediaError::ffmpeg_failed(
                    message,
                    Some(stderr).filter(|s| !s.is_empty()),
                    exit_code,
                ))
            }
            other => other,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let deadline = self.timeout_secs.map(Duration::from_secs);
        let mut cancel_rx = self.cancel_rx.clone();

        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Sender dropped without cancelling
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        let timed_out = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
            _ = timed_out => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                return Err(MediaError::Timeout(secs));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

#[derive(Debug, PartialEq)]
enum ParsedLine {
    /// A complete progress block ended on this line
    Progress(FfmpegProgress),
    /// A `key=value` progress field
    Field,
    /// Anything else FFmpeg wrote
    Diagnostic,
}

/// Parse a line from FFmpeg's `-progress` output.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> ParsedLine {
    let line = line.trim();

    let Some((key, value)) = line.split_once('=') else {
        return ParsedLine::Diagnostic;
    };

    match key {
        "out_time_ms" | "out_time_us" => {
            // FFmpeg reports both keys in microseconds
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return ParsedLine::Progress(current.clone());
        }
        k if k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {}
        _ => return ParsedLine::Diagnostic,
    }

    ParsedLine::Field
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_command_args() {
        let cmd = FfmpegCommand::new("concat.txt", "output.mp4")
            .concat_demuxer()
            .stream_copy();

        let args = cmd.build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i concat.txt -c copy output.mp4"));
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(joined.contains("-v error"));
    }

    #[test]
    fn test_frame_command_args() {
        let cmd = FfmpegCommand::new("input.mp4", "frame.jpg")
            .seek(7.9)
            .single_frame()
            .image_quality(1);

        let args = cmd.build_args().join(" ");
        assert!(args.contains("-ss 7.900 -i input.mp4 -frames:v 1 -q:v 2 frame.jpg"));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert_eq!(
            parse_progress_line("out_time_us=5000000", &mut progress),
            ParsedLine::Field
        );
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(matches!(result, ParsedLine::Progress(p) if p.is_complete));
    }

    #[test]
    fn test_diagnostic_lines_are_kept_apart() {
        let mut progress = FfmpegProgress::default();
        assert_eq!(
            parse_progress_line("concat.txt: Invalid data found when processing input", &mut progress),
            ParsedLine::Diagnostic
        );
        assert_eq!(
            parse_progress_line("[concat @ 0x1] Unsafe file name 'a b'=x", &mut progress),
            ParsedLine::Diagnostic
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_spawn() {
        let (tx, rx) = watch::channel(true);
        let runner = FfmpegRunner::new().with_cancel(rx);
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4");
        assert!(matches!(runner.run(&cmd).await, Err(MediaError::Cancelled)));
        drop(tx);
    }
}
