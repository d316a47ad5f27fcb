//! Frame extraction and the on-disk frame store.
//!
//! [`FrameExtractor`] probes a video, then streams every decoded frame out
//! of FFmpeg as packed RGB24. Frames are produced lazily and in
//! presentation order by [`FrameStream::next_frame`]; a stream cannot be
//! rewound, only re-opened. When a [`FrameStore`] is attached each frame is
//! written as `frame_{index:05}.png` before it is handed out.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aigv_models::{frame_file_name, is_image_file, parse_frame_index};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};
use crate::progress::{is_progress_line, ExtractionProgress};

/// Lines of FFmpeg diagnostics kept for error reports.
const MAX_STDERR_LINES: usize = 50;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based presentation index
    pub index: usize,
    /// RGB raster, shared read-only once decoded
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Ordered, finite source of frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// In-memory frames, mostly for tests and pre-decoded input.
#[async_trait]
impl FrameSource for VecDeque<Frame> {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        Ok(self.pop_front())
    }
}

/// Directory of images keyed by zero-padded frame index.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Open a store, creating the directory if needed.
    pub async fn create(dir: impl Into<PathBuf>) -> MediaResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an image with this index is stored under.
    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(frame_file_name(index))
    }

    /// Encode `image` as PNG under `index`.
    pub async fn save(&self, index: usize, image: Arc<RgbImage>) -> MediaResult<PathBuf> {
        let path = self.path_for(index);
        let target = path.clone();

        tokio::task::spawn_blocking(move || image.save_with_format(&target, ImageFormat::Png))
            .await
            .map_err(|e| MediaError::internal(format!("PNG encoder task failed: {}", e)))??;

        Ok(path)
    }

    /// Stored images in frame-index order; names without an index follow,
    /// sorted by name.
    pub async fn list(&self) -> MediaResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_image_file(&path) {
                paths.push(path);
            }
        }
        paths.sort_by_cached_key(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (parse_frame_index(&name).unwrap_or(usize::MAX), name)
        });
        Ok(paths)
    }
}

/// Decodes a video file into frames.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    video: PathBuf,
    store: Option<FrameStore>,
}

impl FrameExtractor {
    pub fn new(video: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            store: None,
        }
    }

    /// Persist every emitted frame to `store`.
    pub fn with_store(mut self, store: FrameStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Probe the source and start decoding.
    pub async fn open(&self) -> MediaResult<FrameStream> {
        let info = probe_video(&self.video).await?;

        let mut child = FfmpegCommand::to_stdout(&self.video)
            .raw_rgb_frames()
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode("Failed to capture FFmpeg stdout", None))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::decode("Failed to capture FFmpeg stderr", None))?;

        let expected = info.expected_frames();
        let stderr_task = tokio::spawn(drain_stderr(stderr, expected));

        let (width, height) = info.display_dimensions();
        info!(
            video = %self.video.display(),
            width,
            height,
            rotation = info.rotation,
            fps = info.fps,
            expected_frames = ?expected,
            "Frame extraction started"
        );

        Ok(FrameStream {
            frame_bytes: info.rgb_frame_bytes(),
            info,
            child,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            store: self.store.clone(),
            next_index: 0,
            finished: false,
        })
    }

    /// Decode the whole video into memory.
    pub async fn extract_all(&self) -> MediaResult<Vec<Frame>> {
        let mut stream = self.open().await?;
        let mut frames = Vec::new();
        while let Some(frame) = stream.next_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Live decode of one video.
pub struct FrameStream {
    info: VideoInfo,
    frame_bytes: usize,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    store: Option<FrameStore>,
    next_index: usize,
    finished: bool,
}

impl FrameStream {
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Frames emitted so far.
    pub fn frames_emitted(&self) -> usize {
        self.next_index
    }

    async fn finish(&mut self) -> MediaResult<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| MediaError::decode(format!("FFmpeg process error: {}", e), None))?;
        let stderr = self.collect_stderr().await;

        if !status.success() {
            return Err(MediaError::decode(
                format!(
                    "FFmpeg exited with status {:?} after {} frames",
                    status.code(),
                    self.next_index
                ),
                stderr,
            ));
        }

        info!(frames = self.next_index, "Frame extraction complete");
        Ok(())
    }

    async fn collect_stderr(&mut self) -> Option<String> {
        match self.stderr_task.take() {
            Some(task) => task.await.ok().filter(|s| !s.is_empty()),
            None => None,
        }
    }
}

#[async_trait]
impl FrameSource for FrameStream {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let buf = match read_frame(&mut self.stdout, self.frame_bytes, self.next_index).await {
            Ok(Some(buf)) => buf,
            Ok(None) => {
                self.finished = true;
                self.finish().await?;
                return Ok(None);
            }
            Err(MediaError::Decode { message, .. }) => {
                self.finished = true;
                let stderr = self.collect_stderr().await;
                return Err(MediaError::decode(message, stderr));
            }
            Err(e) => return Err(e),
        };

        let (width, height) = self.info.display_dimensions();
        let image = RgbImage::from_raw(width, height, buf)
            .ok_or_else(|| MediaError::internal("Frame buffer does not match dimensions"))?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        metrics::counter!("aigv_frames_decoded_total").increment(1);

        if let Some(store) = &self.store {
            store.save(frame.index, Arc::clone(&frame.image)).await?;
        }

        Ok(Some(frame))
    }
}

/// Read exactly one frame.
///
/// Returns `None` on a clean end of stream. A stream ending part-way
/// through a frame is a decode error.
async fn read_frame<R>(reader: &mut R, frame_bytes: usize, index: usize) -> MediaResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; frame_bytes];
    let mut filled = 0;
    while filled < frame_bytes {
        let n = reader.read(&mut buf[filled..]).await.map_err(|e| {
            MediaError::decode(format!("Failed to read frame {}: {}", index, e), None)
        })?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    match filled {
        0 => Ok(None),
        n if n == frame_bytes => Ok(Some(buf)),
        n => Err(MediaError::decode(
            format!(
                "Stream ended inside frame {} ({} of {} bytes)",
                index, n, frame_bytes
            ),
            None,
        )),
    }
}

/// Log progress lines and keep the tail of everything else.
async fn drain_stderr(stderr: ChildStderr, expected: Option<u64>) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut progress = ExtractionProgress::default();
    let mut diagnostics: VecDeque<String> = VecDeque::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if is_progress_line(&line) {
            if let Some(snapshot) = progress.parse_line(&line) {
                debug!(
                    frame = snapshot.frame,
                    fps = snapshot.fps,
                    percent = ?expected.map(|total| snapshot.percentage(total)),
                    "Frame extraction progress"
                );
            }
        } else if !line.trim().is_empty() {
            if diagnostics.len() == MAX_STDERR_LINES {
                diagnostics.pop_front();
            }
            diagnostics.push_back(line);
        }
    }

    Vec::from(diagnostics).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::check_ffmpeg;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([value, value, value]))
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let data = vec![7u8; 12];
        let mut reader = data.as_slice();

        let first = read_frame(&mut reader, 6, 0).await.unwrap();
        assert_eq!(first.unwrap().len(), 6);
        assert!(read_frame(&mut reader, 6, 1).await.unwrap().is_some());
        assert!(read_frame(&mut reader, 6, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_short_read_is_decode_error() {
        let data = vec![1u8; 10];
        let mut reader = data.as_slice();

        assert!(read_frame(&mut reader, 6, 0).await.unwrap().is_some());
        let err = read_frame(&mut reader, 6, 1).await.unwrap_err();
        assert!(matches!(err, MediaError::Decode { .. }));
        assert!(err.to_string().contains("frame 1"));
    }

    #[tokio::test]
    async fn test_store_save_and_list_in_index_order() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::create(dir.path().join("frames")).await.unwrap();

        for index in [100_000, 2, 0] {
            store.save(index, Arc::new(solid(4, 3, 9))).await.unwrap();
        }
        fs::write(store.dir().join("notes.txt"), b"x").await.unwrap();

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["frame_00000.png", "frame_00002.png", "frame_100000.png"]);

        let reloaded = image::open(store.path_for(2)).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (4, 3));
    }

    #[tokio::test]
    async fn test_memory_source_is_ordered() {
        let mut frames: VecDeque<Frame> = (0..3).map(|i| Frame::new(i, solid(2, 2, i as u8))).collect();
        let mut seen = Vec::new();
        while let Some(frame) = frames.next_frame().await.unwrap() {
            seen.push(frame.index);
        }
        assert_eq!(seen, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_extract_synthetic_video() {
        if check_ffmpeg().is_err() || crate::command::check_ffprobe().is_err() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10"])
            .args(["-frames:v", "3", "-pix_fmt", "yuv420p"])
            .arg(&video)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let store = FrameStore::create(dir.path().join("frames")).await.unwrap();
        let frames = FrameExtractor::new(&video)
            .with_store(store.clone())
            .extract_all()
            .await
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].index, 2);
        assert_eq!((frames[0].width(), frames[0].height()), (64, 48));
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_extract_rotated_video_is_upright() {
        if check_ffmpeg().is_err() || crate::command::check_ffprobe().is_err() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("landscape.mp4");
        let rotated = dir.path().join("portrait.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10"])
            .args(["-frames:v", "2", "-pix_fmt", "yuv420p"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        // -display_rotation needs FFmpeg 6+
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-display_rotation", "90", "-i"])
            .arg(&source)
            .args(["-c", "copy"])
            .arg(&rotated)
            .status()
            .await
            .unwrap();
        if !status.success() {
            return;
        }

        let frames = FrameExtractor::new(&rotated).extract_all().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].width(), frames[0].height()), (48, 64));
    }

    #[tokio::test]
    async fn test_open_missing_video() {
        let err = FrameExtractor::new("/nonexistent.mp4").open().await.err().unwrap();
        assert!(matches!(err, MediaError::Decode { .. }));
    }
}
