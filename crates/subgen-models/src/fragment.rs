//! The generated subtitle for one (chunk, language, flags) combination.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::flags::GenerationFlags;
use crate::language::LanguageCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub chunk_index: u32,
    pub language: LanguageCode,
    pub flags: GenerationFlags,
    pub remote_uri: Option<String>,
    pub local_path: Option<PathBuf>,
    /// Raw SRT text returned by the model port, once downloaded.
    pub content: Option<String>,
    /// Prompt-variant discriminator for languages with more than one
    /// generation method per chunk (currently only `hin`'s "direct"/"translate"
    /// dual-method special case); `None` for every single-method language.
    #[serde(default)]
    pub method: Option<String>,
}

impl Fragment {
    pub fn new(chunk_index: u32, language: LanguageCode, flags: GenerationFlags) -> Self {
        Self {
            chunk_index,
            language,
            flags,
            remote_uri: None,
            local_path: None,
            content: None,
            method: None,
        }
    }

    /// The merge-group key this fragment belongs to, e.g. `"eng"` or `"eng_ext"`.
    pub fn group_key(&self) -> String {
        format!("{}{}", self.language.as_str(), self.flags.variant_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_includes_ext_suffix() {
        let lang = LanguageCode::parse("eng").unwrap();
        let plain = Fragment::new(0, lang, GenerationFlags::default());
        let sdh = Fragment::new(0, lang, GenerationFlags { sdh: true });
        assert_eq!(plain.group_key(), "eng");
        assert_eq!(sdh.group_key(), "eng_ext");
    }
}
