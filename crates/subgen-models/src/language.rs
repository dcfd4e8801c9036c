//! Target language codes and per-language quality bands.

use std::fmt;

/// A closed set of three-letter target language codes.
///
/// Extending this set is a deliberate, reviewed change (new script ranges
/// and reading-speed bands must be added to [`LanguageSpec::for_code`] at
/// the same time), matching the original implementation's closed
/// `language_selector.py` allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LanguageCode([u8; 3]);

impl LanguageCode {
    /// Parse a three-letter code, rejecting anything not in [`KNOWN_LANGUAGES`].
    pub fn parse(code: &str) -> Result<Self, UnknownLanguageError> {
        let lower = code.trim().to_ascii_lowercase();
        if lower.len() != 3 {
            return Err(UnknownLanguageError(code.to_string()));
        }
        if !KNOWN_LANGUAGES.contains(&lower.as_str()) {
            return Err(UnknownLanguageError(code.to_string()));
        }
        let bytes = lower.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: constructed only from validated ASCII lowercase letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown language code: {0}")]
pub struct UnknownLanguageError(pub String);

/// Closed allow-list of supported three-letter language codes.
pub const KNOWN_LANGUAGES: &[&str] = &[
    "eng", "hin", "ben", "spa", "fra", "deu", "por", "jpn", "kor", "zho", "ara", "rus", "tam",
    "tel", "mar", "guj", "urd", "pan", "ita", "vie",
];

/// Unicode script range and reading-speed band for one language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub code: &'static str,
    /// Inclusive Unicode code point range the script is expected to fall in.
    pub script_range: (u32, u32),
    /// (min, max) characters-per-second reading speed band.
    pub reading_speed_cps: (f64, f64),
}

/// Seed language spec table, grounded on the original `precision_validator.py`.
///
/// Languages without an explicit entry fall back to [`DEFAULT_SPEC`] (Latin
/// script range, the English reading-speed band) rather than failing
/// validation outright — extending this table with dedicated bands is a
/// quality improvement, not a correctness requirement.
const LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        code: "eng",
        script_range: (0x0041, 0x024F), // Basic Latin + Latin Extended
        reading_speed_cps: (15.0, 20.0),
    },
    LanguageSpec {
        code: "ben",
        script_range: (0x0980, 0x09FF), // Bengali
        reading_speed_cps: (12.0, 18.0),
    },
    LanguageSpec {
        code: "hin",
        script_range: (0x0900, 0x097F), // Devanagari
        reading_speed_cps: (14.0, 19.0),
    },
];

const DEFAULT_SPEC: LanguageSpec = LanguageSpec {
    code: "???",
    script_range: (0x0041, 0x024F),
    reading_speed_cps: (15.0, 20.0),
};

impl LanguageSpec {
    pub fn for_code(code: &LanguageCode) -> LanguageSpec {
        LANGUAGE_SPECS
            .iter()
            .find(|spec| spec.code == code.as_str())
            .copied()
            .unwrap_or(DEFAULT_SPEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_code_case_insensitively() {
        let code = LanguageCode::parse("ENG").unwrap();
        assert_eq!(code.as_str(), "eng");
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(LanguageCode::parse("xyz").is_err());
        assert!(LanguageCode::parse("en").is_err());
    }

    #[test]
    fn hindi_spec_uses_devanagari_range() {
        let code = LanguageCode::parse("hin").unwrap();
        let spec = LanguageSpec::for_code(&code);
        assert_eq!(spec.script_range, (0x0900, 0x097F));
        assert_eq!(spec.reading_speed_cps, (14.0, 19.0));
    }
}
