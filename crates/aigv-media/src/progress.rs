//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information reported by FFmpeg during frame extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionProgress {
    /// Frames decoded so far
    pub frame: u64,
    /// Current decode FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Decode speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether decoding is complete
    pub is_complete: bool,
}

impl ExtractionProgress {
    /// Progress percentage against the declared frame count.
    pub fn percentage(&self, total_frames: u64) -> f64 {
        if total_frames == 0 {
            return 0.0;
        }
        ((self.frame as f64 / total_frames as f64) * 100.0).min(100.0)
    }

    /// Parse one line of `-progress pipe:2` output.
    ///
    /// Returns a snapshot at the end of every progress block, `None`
    /// otherwise. Lines that are not `key=value` pairs are ignored.
    pub fn parse_line(&mut self, line: &str) -> Option<ExtractionProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Whether a stderr line belongs to FFmpeg's machine-readable progress block.
pub fn is_progress_line(line: &str) -> bool {
    const KEYS: [&str; 12] = [
        "frame",
        "fps",
        "stream_0_0_q",
        "bitrate",
        "total_size",
        "out_time_us",
        "out_time_ms",
        "out_time",
        "dup_frames",
        "drop_frames",
        "speed",
        "progress",
    ];
    line.split_once('=')
        .map(|(key, _)| KEYS.contains(&key.trim()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = ExtractionProgress {
            frame: 50,
            ..Default::default()
        };

        assert!((progress.percentage(100) - 50.0).abs() < 0.01);
        assert!((progress.percentage(25) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = ExtractionProgress::default();

        assert!(progress.parse_line("frame=42").is_none());
        assert!(progress.parse_line("out_time_us=5000000").is_none());
        progress.parse_line("speed=1.5x");
        progress.parse_line("speed=N/A");

        let snapshot = progress.parse_line("progress=end").unwrap();
        assert_eq!(snapshot.frame, 42);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(snapshot.is_complete);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("frame=12"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("[mov,mp4] moov atom not found"));
        assert!(!is_progress_line("input.mp4: Invalid data found when processing input"));
    }
}
