//! A single timed subtitle line within one track.

use serde::{Deserialize, Serialize};

/// One cue in a subtitle track. Within a track, `seq` is dense starting at
/// 1, and entries are strictly monotonic and non-overlapping:
/// `start_ms[i+1] >= end_ms[i]` and `end_ms > start_ms` for every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    pub seq: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl SubtitleEntry {
    pub fn new(seq: u32, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.end_ms > self.start_ms
    }
}

/// Checks the track-level invariants across an already-ordered sequence of
/// entries: dense 1-based `seq`, strict monotonicity, and `end > start` for
/// every entry.
pub fn track_is_valid(entries: &[SubtitleEntry]) -> bool {
    for (i, entry) in entries.iter().enumerate() {
        if entry.seq != (i as u32) + 1 || !entry.is_well_formed() {
            return false;
        }
        if let Some(prev) = entries.get(i.wrapping_sub(1)).filter(|_| i > 0) {
            if entry.start_ms < prev.end_ms {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_track_is_valid() {
        assert!(track_is_valid(&[]));
    }

    #[test]
    fn detects_overlap() {
        let entries = vec![
            SubtitleEntry::new(1, 0, 1000, "a"),
            SubtitleEntry::new(2, 500, 1500, "b"),
        ];
        assert!(!track_is_valid(&entries));
    }

    #[test]
    fn detects_non_dense_seq() {
        let entries = vec![
            SubtitleEntry::new(1, 0, 1000, "a"),
            SubtitleEntry::new(3, 1000, 2000, "b"),
        ];
        assert!(!track_is_valid(&entries));
    }

    #[test]
    fn accepts_adjacent_non_overlapping_entries() {
        let entries = vec![
            SubtitleEntry::new(1, 0, 1000, "a"),
            SubtitleEntry::new(2, 1000, 2000, "b"),
        ];
        assert!(track_is_valid(&entries));
    }
}
