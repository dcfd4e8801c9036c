//! A contiguous time-range slice of the source video.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One chunk produced by splitting a video into `ceil(duration / chunk_len)`
/// equal-length pieces, with the final chunk absorbing the remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based, dense within a job.
    pub index: u32,
    pub start_sec: f64,
    pub duration_sec: f64,
    pub local_path: PathBuf,
    pub remote_uri: Option<String>,
    pub size_bytes: Option<u64>,
}

impl Chunk {
    pub fn new(index: u32, start_sec: f64, duration_sec: f64, local_path: PathBuf) -> Self {
        Self {
            index,
            start_sec,
            duration_sec,
            local_path,
            remote_uri: None,
            size_bytes: None,
        }
    }

    /// Number of chunks a video of `duration_sec` splits into at `chunk_len_sec`.
    pub fn count_for(duration_sec: f64, chunk_len_sec: f64) -> u32 {
        (duration_sec / chunk_len_sec).ceil().max(1.0) as u32
    }

    /// Duration of the chunk at `index` out of `total`, given the video's
    /// total duration and the nominal chunk length — the last chunk absorbs
    /// whatever remains instead of being padded or truncated.
    pub fn duration_for_index(index: u32, total: u32, duration_sec: f64, chunk_len_sec: f64) -> f64 {
        if index + 1 == total {
            duration_sec - (total - 1) as f64 * chunk_len_sec
        } else {
            chunk_len_sec
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_rounds_up_and_last_chunk_absorbs_remainder() {
        let total = Chunk::count_for(125.0, 60.0);
        assert_eq!(total, 3);
        let last = Chunk::duration_for_index(2, total, 125.0, 60.0);
        assert!((last - 5.0).abs() < 1e-9);
    }

    #[test]
    fn exact_multiple_has_no_remainder_chunk() {
        let total = Chunk::count_for(120.0, 60.0);
        assert_eq!(total, 2);
        let last = Chunk::duration_for_index(1, total, 120.0, 60.0);
        assert!((last - 60.0).abs() < 1e-9);
    }
}
