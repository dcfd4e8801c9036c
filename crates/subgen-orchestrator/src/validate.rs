//! Subtitle validator (C10): strict format parsing, per-language script and
//! reading-speed checks, grounded on the original `precision_validator.py`'s
//! report shape and language table (itself already mirrored in
//! `subgen_models::language`).

use regex::Regex;
use std::sync::OnceLock;

use subgen_models::{LanguageCode, LanguageSpec};

const MAX_CHARS_PER_LINE: usize = 42;
const MAX_LINES_PER_ENTRY: usize = 2;
/// A block whose CPS exceeds the language's max band by more than this
/// fraction is a critical error rather than a warning.
const READING_SPEED_CRITICAL_OVERSHOOT: f64 = 0.20;

fn timing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2}:\d{2}:\d{2},\d{3})\s*-->\s*(\d{1,2}:\d{2}:\d{2},\d{3})$").unwrap()
    })
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QualityMetrics {
    pub entry_count: usize,
    pub average_cps: f64,
    pub max_cps: f64,
    pub out_of_band_entries: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationReport {
    pub critical_errors: Vec<String>,
    pub warnings: Vec<String>,
    pub quality_metrics: QualityMetrics,
    pub production_ready: bool,
}

/// Validates one already-merged SRT track's text against strict format and
/// per-language quality rules.
pub fn validate_srt(content: &str, language: LanguageCode) -> ValidationReport {
    let mut critical_errors = Vec::new();
    let mut warnings = Vec::new();

    let blocks = parse_strict(content, &mut critical_errors);
    check_sequence_density(&blocks, &mut critical_errors);

    let spec = LanguageSpec::for_code(&language);
    let mut total_cps = 0.0;
    let mut max_cps: f64 = 0.0;
    let mut out_of_band = 0usize;

    for block in &blocks {
        check_format(block, &mut critical_errors, &mut warnings);
        let cps = compute_cps(block);
        total_cps += cps;
        max_cps = max_cps.max(cps);

        if cps > spec.reading_speed_cps.1 {
            out_of_band += 1;
            let overshoot = (cps - spec.reading_speed_cps.1) / spec.reading_speed_cps.1;
            if overshoot > READING_SPEED_CRITICAL_OVERSHOOT {
                critical_errors.push(format!(
                    "block {}: reading speed {:.1} cps exceeds max {:.1} cps by more than {:.0}%",
                    block.seq,
                    cps,
                    spec.reading_speed_cps.1,
                    READING_SPEED_CRITICAL_OVERSHOOT * 100.0
                ));
            } else {
                warnings.push(format!(
                    "block {}: reading speed {:.1} cps exceeds max {:.1} cps",
                    block.seq, cps, spec.reading_speed_cps.1
                ));
            }
        } else if cps < spec.reading_speed_cps.0 && cps > 0.0 {
            warnings.push(format!(
                "block {}: reading speed {:.1} cps is below the min {:.1} cps",
                block.seq, cps, spec.reading_speed_cps.0
            ));
        }

        check_script(block, spec, &mut critical_errors);
    }

    let entry_count = blocks.len();
    let average_cps = if entry_count > 0 { total_cps / entry_count as f64 } else { 0.0 };

    let quality_metrics = QualityMetrics {
        entry_count,
        average_cps,
        max_cps,
        out_of_band_entries: out_of_band,
    };

    ValidationReport {
        production_ready: critical_errors.is_empty(),
        critical_errors,
        warnings,
        quality_metrics,
    }
}

struct StrictBlock {
    seq: u32,
    start_ms: u64,
    end_ms: u64,
    lines: Vec<String>,
}

fn parse_strict(content: &str, critical_errors: &mut Vec<String>) -> Vec<StrictBlock> {
    let normalized = content.replace('\u{feff}', "").replace("\r\n", "\n");
    let mut blocks = Vec::new();

    for raw_block in normalized.trim().split("\n\n") {
        let raw_block = raw_block.trim();
        if raw_block.is_empty() {
            continue;
        }
        let lines: Vec<&str> = raw_block.lines().collect();
        if lines.len() < 3 {
            critical_errors.push(format!("malformed block (fewer than 3 lines): {raw_block:?}"));
            continue;
        }

        let Ok(seq) = lines[0].trim().parse::<u32>() else {
            critical_errors.push(format!("block missing a numeric sequence id: {:?}", lines[0]));
            continue;
        };

        let Some(captures) = timing_re().captures(lines[1].trim()) else {
            critical_errors.push(format!("block {seq}: timing line does not match HH:MM:SS,mmm --> HH:MM:SS,mmm"));
            continue;
        };
        let start_ms = parse_strict_timestamp(&captures[1]);
        let end_ms = parse_strict_timestamp(&captures[2]);
        if end_ms <= start_ms {
            critical_errors.push(format!("block {seq}: end time does not exceed start time"));
        }

        blocks.push(StrictBlock {
            seq,
            start_ms,
            end_ms,
            lines: lines[2..].iter().map(|l| l.to_string()).collect(),
        });
    }

    blocks
}

fn parse_strict_timestamp(raw: &str) -> u64 {
    let (hms, millis) = raw.split_once(',').unwrap_or((raw, "0"));
    let mut parts = hms.split(':');
    let hours: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minutes: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let seconds: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let millis: u64 = millis.parse().unwrap_or(0);
    hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis
}

fn check_sequence_density(blocks: &[StrictBlock], critical_errors: &mut Vec<String>) {
    for (i, block) in blocks.iter().enumerate() {
        if block.seq != i as u32 + 1 {
            critical_errors.push(format!(
                "sequence gap: expected block {} but found {}",
                i + 1,
                block.seq
            ));
        }
        if i > 0 && block.start_ms < blocks[i - 1].end_ms {
            critical_errors.push(format!("block {}: overlaps the previous block", block.seq));
        }
    }
}

fn check_format(block: &StrictBlock, critical_errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    if block.lines.len() > MAX_LINES_PER_ENTRY {
        critical_errors.push(format!(
            "block {}: {} lines exceeds the {}-line limit",
            block.seq,
            block.lines.len(),
            MAX_LINES_PER_ENTRY
        ));
    }
    for line in &block.lines {
        if line.chars().count() > MAX_CHARS_PER_LINE {
            warnings.push(format!(
                "block {}: line {:?} exceeds {} characters",
                block.seq, line, MAX_CHARS_PER_LINE
            ));
        }
    }
}

fn compute_cps(block: &StrictBlock) -> f64 {
    let duration_sec = (block.end_ms.saturating_sub(block.start_ms)) as f64 / 1000.0;
    if duration_sec <= 0.0 {
        return 0.0;
    }
    let char_count: usize = block.lines.iter().map(|l| l.chars().count()).sum();
    char_count as f64 / duration_sec
}

fn check_script(block: &StrictBlock, spec: LanguageSpec, critical_errors: &mut Vec<String>) {
    let (lo, hi) = spec.script_range;
    let mut saw_letter = false;
    let mut out_of_range = false;

    for line in &block.lines {
        for ch in line.chars() {
            if !ch.is_alphabetic() {
                continue;
            }
            saw_letter = true;
            let code = ch as u32;
            if code < lo || code > hi {
                out_of_range = true;
            }
        }
    }

    if saw_letter && out_of_range {
        critical_errors.push(format!(
            "block {}: contains characters outside the expected {} script range",
            block.seq, spec.code
        ));
    }
}
