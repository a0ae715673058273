//! ffmpeg progress parsing and the early-abort arithmetic.
//!
//! ffmpeg reports progress on stderr as lines like
//! `frame=  100 fps= 25 q=28.0 size=     256kB time=00:00:10.48 ...`.
//! Only lines carrying a `frame=` token are considered progress.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub time_secs: f64,
    pub size_bytes: f64,
}

pub struct ProgressParser {
    time_hms: Regex,
    time_secs: Regex,
    size_kb: Regex,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            time_hms: Regex::new(r"time=(\d+):(\d+):(\d+)\.(\d+)").unwrap(),
            time_secs: Regex::new(r"time=(\d+\.\d+)").unwrap(),
            size_kb: Regex::new(r"size=\s*(\d+)\s*kB").unwrap(),
        }
    }

    /// Extract time and size from a progress line; `None` for lines
    /// without a `frame=` token. Missing fields default to zero, which
    /// keeps the projection gate closed.
    pub fn parse_line(&self, line: &str) -> Option<ProgressSample> {
        if !line.contains("frame=") {
            return None;
        }

        let time_secs = if let Some(caps) = self.time_hms.captures(line) {
            let hours: f64 = caps[1].parse().unwrap_or(0.0);
            let minutes: f64 = caps[2].parse().unwrap_or(0.0);
            let seconds: f64 = caps[3].parse().unwrap_or(0.0);
            let centis: f64 = caps[4].parse().unwrap_or(0.0);
            hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0
        } else if let Some(caps) = self.time_secs.captures(line) {
            caps[1].parse().unwrap_or(0.0)
        } else {
            0.0
        };

        let size_bytes = self
            .size_kb
            .captures(line)
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .map(|kilobytes| kilobytes * 1024.0)
            .unwrap_or(0.0);

        Some(ProgressSample {
            time_secs,
            size_bytes,
        })
    }
}

/// Project the final output size from a sample. The projection only
/// kicks in strictly past ten seconds of encoded time and with a known
/// container duration.
pub fn project_final_size(sample: ProgressSample, total_duration_secs: f64) -> Option<f64> {
    (sample.time_secs > 10.0 && total_duration_secs > 0.0)
        .then(|| sample.size_bytes / sample.time_secs * total_duration_secs)
}

/// `1 - estimated / original`; negative when the output is projected to
/// grow.
pub fn reduction_ratio(estimated_final_size: f64, original_size: i64) -> f64 {
    1.0 - estimated_final_size / original_size as f64
}

/// Strict less-than: a ratio exactly at the threshold proceeds.
pub fn below_threshold(ratio: f64, min_reduction_ratio: f64) -> bool {
    ratio < min_reduction_ratio
}
