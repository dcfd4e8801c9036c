//! Generation flags threaded from the job down into the model port.

use serde::{Deserialize, Serialize};

/// Per-(chunk, language) generation flags, carried alongside a [`crate::Fragment`]
/// so the merger and validator know which variant of a track they're holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFlags {
    /// Subtitles-for-the-deaf-and-hard-of-hearing: includes non-speech cues.
    #[serde(default)]
    pub sdh: bool,
}

impl GenerationFlags {
    /// Suffix used to key merge groups and output filenames, e.g. `eng_ext`
    /// (spec §6 names the extended/SDH variant's filename suffix `_ext`).
    pub fn variant_suffix(self) -> &'static str {
        if self.sdh {
            "_ext"
        } else {
            ""
        }
    }
}
