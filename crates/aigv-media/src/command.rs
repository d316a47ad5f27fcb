//! FFmpeg command builder.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Output target that writes to the child's stdout.
pub const STDOUT_OUTPUT: &str = "-";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output path, or `-` for stdout
    output: String,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_string_lossy().to_string(),
            output_args: Vec::new(),
        }
    }

    /// Create a command that writes its output to stdout.
    pub fn to_stdout(input: impl AsRef<Path>) -> Self {
        Self::new(input, STDOUT_OUTPUT)
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

    /// Emit every decoded frame, unmodified, as packed RGB24 rawvideo.
    ///
    /// `passthrough` keeps FFmpeg from duplicating or dropping frames to hit
    /// a constant output rate, so one output frame is one decoded frame.
    pub fn raw_rgb_frames(self) -> Self {
        self.output_args([
            "-fps_mode",
            "passthrough",
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
        ])
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string()];

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress goes to stderr alongside diagnostics
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }

    /// Spawn FFmpeg with stdout and stderr piped.
    ///
    /// The child is killed when dropped so an abandoned stream does not
    /// leave a decoder running.
    pub fn spawn(&self) -> MediaResult<Child> {
        check_ffmpeg()?;

        let args = self.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::decode(format!("Failed to spawn FFmpeg: {}", e), None))?;

        Ok(child)
    }
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
    fn test_raw_frame_command() {
        let args = FfmpegCommand::to_stdout("input.mp4").raw_rgb_frames().build_args();

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "input.mp4");
        assert_eq!(args.last().map(String::as_str), Some("-"));

        let out = &args[i + 2..];
        assert_eq!(
            out,
            ["-fps_mode", "passthrough", "-pix_fmt", "rgb24", "-f", "rawvideo", "-"]
        );
        assert!(args.contains(&"pipe:2".to_string()));
    }
}
