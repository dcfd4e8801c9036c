//! Subtitle merger (C9): offsets, renumbers, and stitches per-chunk
//! fragments into one final track per (language, flag) group, then
//! serializes to SRT and VTT. Grounded directly on the original
//! `subtitle_merger.py`, re-expressed with typed structs and `Result`
//! propagation instead of dict access and catch-and-continue prints.

use std::path::{Path, PathBuf};

use subgen_models::{Fragment, SubtitleEntry};

/// Overlaps up to this size are silently closed by pulling the earlier
/// entry's `end_ms` back to the next entry's `start_ms`; anything larger is
/// a [`MergeError::Overlap`].
const MICRO_OVERLAP_TOLERANCE_MS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no fragments supplied for group '{group}'")]
    EmptyGroup { group: String },

    #[error("fragment for chunk {chunk_index} of group '{group}' contains no parseable subtitle entries")]
    UnparseableFragment { group: String, chunk_index: u32 },

    #[error(
        "merged track for group '{group}' has an overlap of {overlap_ms}ms between chunk {chunk_index} \
         entry {seq} and the following entry, exceeding the {tolerance_ms}ms micro-overlap tolerance"
    )]
    Overlap {
        group: String,
        chunk_index: u32,
        seq: u32,
        overlap_ms: u64,
        tolerance_ms: u64,
    },

    #[error("merged track for group '{group}' failed its invariant check after assembly")]
    InvariantViolation { group: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One raw (unrenumbered, unoffset) entry parsed out of a single fragment's
/// SRT text.
#[derive(Debug, Clone, PartialEq)]
struct RawEntry {
    start_ms: u64,
    end_ms: u64,
    text: String,
}

/// Tolerant SRT parser: skips malformed blocks instead of failing the whole
/// fragment, accepts either comma or dot as the decimal separator, and
/// normalizes CRLF line endings. Mirrors
/// `subtitle_merger.py::_parse_srt_content`.
fn parse_srt(content: &str) -> Vec<RawEntry> {
    let normalized = content.replace("\r\n", "\n").replace('\u{feff}', "");
    let mut entries = Vec::new();

    for block in split_blocks(&normalized) {
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }
        if lines[0].trim().parse::<u32>().is_err() {
            continue;
        }
        let Some((start_ms, end_ms)) = parse_timing_line(lines[1].trim()) else {
            continue;
        };
        let text = lines[2..].join("\n").trim().to_string();
        if text.is_empty() {
            continue;
        }
        entries.push(RawEntry { start_ms, end_ms, text });
    }

    entries
}

/// Splits on one-or-more blank lines, matching the original's
/// `re.split(r'\n\s*\n', content)`.
fn split_blocks(content: &str) -> Vec<&str> {
    content
        .trim()
        .split("\n\n")
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .collect()
}

fn parse_timing_line(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.split_once("-->")?;
    let start_ms = parse_timestamp(start.trim())?;
    let end_ms = parse_timestamp(end.trim())?;
    Some((start_ms, end_ms))
}

/// Parses `HH:MM:SS,mmm` or `HH:MM:SS.mmm` into milliseconds.
fn parse_timestamp(raw: &str) -> Option<u64> {
    let normalized = raw.replace(',', ".");
    let (hms, millis) = normalized.split_once('.')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: u64 = parts.next()?.trim().parse().ok()?;
    let millis_str = format!("{:0<3}", &millis[..millis.len().min(3)]);
    let millis: u64 = millis_str.parse().ok()?;
    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

fn format_srt_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

fn format_vtt_timestamp(ms: u64) -> String {
    format_srt_timestamp(ms).replace(',', ".")
}

/// The assembled, renumbered, offset track for one (language, flag) group.
#[derive(Debug, Clone)]
pub struct MergedTrack {
    pub group_key: String,
    pub entries: Vec<SubtitleEntry>,
}

/// Merge every fragment in `fragments` (already filtered to one group) into
/// a single offset, renumbered, invariant-checked track.
///
/// `fragments` need not be pre-sorted; this sorts by `chunk_index`
/// ascending per the spec. For languages with a dual-method special case
/// (currently only `hin`), callers must have already reduced `fragments` to
/// one fragment per chunk index by applying [`select_method`].
pub fn merge_group(
    group_key: &str,
    fragments: &[Fragment],
    chunk_duration_sec: f64,
) -> Result<MergedTrack, MergeError> {
    if fragments.is_empty() {
        return Err(MergeError::EmptyGroup { group: group_key.to_string() });
    }

    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.chunk_index);

    let offset_ms_per_chunk = (chunk_duration_sec * 1000.0).round() as u64;
    let mut offset_entries: Vec<(u32, RawEntry)> = Vec::new();

    for fragment in &ordered {
        let content = fragment.content.as_deref().unwrap_or_default();
        let parsed = parse_srt(content);
        if parsed.is_empty() {
            return Err(MergeError::UnparseableFragment {
                group: group_key.to_string(),
                chunk_index: fragment.chunk_index,
            });
        }

        let offset_ms = fragment.chunk_index as u64 * offset_ms_per_chunk;
        for entry in parsed {
            offset_entries.push((
                fragment.chunk_index,
                RawEntry {
                    start_ms: entry.start_ms + offset_ms,
                    end_ms: entry.end_ms + offset_ms,
                    text: entry.text,
                },
            ));
        }
    }

    // Entries within a fragment are already chronological; fragments are
    // processed in chunk-index order, so a stable sort just protects
    // against a model returning out-of-order timestamps within one chunk.
    offset_entries.sort_by_key(|(_, e)| e.start_ms);

    close_micro_overlaps(group_key, &mut offset_entries)?;

    let entries: Vec<SubtitleEntry> = offset_entries
        .into_iter()
        .enumerate()
        .map(|(i, (_, raw))| SubtitleEntry::new(i as u32 + 1, raw.start_ms, raw.end_ms, raw.text))
        .collect();

    if !subgen_models::track_is_valid(&entries) {
        return Err(MergeError::InvariantViolation { group: group_key.to_string() });
    }

    Ok(MergedTrack { group_key: group_key.to_string(), entries })
}

/// Walks entries in start-time order and pulls `end_ms` back to the next
/// entry's `start_ms` for overlaps under [`MICRO_OVERLAP_TOLERANCE_MS`];
/// anything larger is a [`MergeError::Overlap`] naming the offending chunk.
fn close_micro_overlaps(group_key: &str, entries: &mut [(u32, RawEntry)]) -> Result<(), MergeError> {
    for i in 0..entries.len().saturating_sub(1) {
        let (chunk_index, _) = entries[i];
        let next_start = entries[i + 1].1.start_ms;
        let this_end = entries[i].1.end_ms;

        if this_end > next_start {
            let overlap_ms = this_end - next_start;
            if overlap_ms > MICRO_OVERLAP_TOLERANCE_MS {
                return Err(MergeError::Overlap {
                    group: group_key.to_string(),
                    chunk_index,
                    seq: i as u32 + 1,
                    overlap_ms,
                    tolerance_ms: MICRO_OVERLAP_TOLERANCE_MS,
                });
            }
            entries[i].1.end_ms = next_start;
        }
    }
    Ok(())
}

/// Serializes a track to SRT text (comma decimal separator), without a BOM
/// — callers prepend the BOM when writing to disk.
pub fn serialize_srt(track: &MergedTrack) -> String {
    let mut out = String::new();
    for entry in &track.entries {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            entry.seq,
            format_srt_timestamp(entry.start_ms),
            format_srt_timestamp(entry.end_ms),
            entry.text
        ));
    }
    out
}

/// Serializes a track to WebVTT text (dot decimal separator, leading
/// `WEBVTT` header, no per-entry sequence numbers), without a BOM.
pub fn serialize_vtt(track: &MergedTrack) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for entry in &track.entries {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            format_vtt_timestamp(entry.start_ms),
            format_vtt_timestamp(entry.end_ms),
            entry.text
        ));
    }
    out
}

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Writes `content` with a UTF-8 BOM prefix, matching the original's
/// `encoding='utf-8-sig'` for maximum player compatibility.
async fn write_with_bom(path: &Path, content: &str) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + content.len());
    bytes.extend_from_slice(&UTF8_BOM);
    bytes.extend_from_slice(content.as_bytes());
    tokio::fs::write(path, bytes).await
}

/// Output file paths produced for one merged group.
#[derive(Debug, Clone)]
pub struct MergedOutputFiles {
    pub srt_path: PathBuf,
    pub vtt_path: PathBuf,
}

/// Writes the SRT and VTT for one group under
/// `<output_root>/<video_stem>/<video_stem>_<group_key>.{srt,vtt}`.
pub async fn write_group_outputs(
    output_root: &Path,
    video_stem: &str,
    track: &MergedTrack,
) -> Result<MergedOutputFiles, MergeError> {
    let dir = output_root.join(video_stem);
    tokio::fs::create_dir_all(&dir).await?;

    let srt_path = dir.join(format!("{video_stem}_{}.srt", track.group_key));
    let vtt_path = dir.join(format!("{video_stem}_{}.vtt", track.group_key));

    write_with_bom(&srt_path, &serialize_srt(track)).await?;
    write_with_bom(&vtt_path, &serialize_vtt(track)).await?;

    Ok(MergedOutputFiles { srt_path, vtt_path })
}

/// Writes the plain-text manifest summarizing every produced file, grounded
/// on `subtitle_merger.py::_create_summary_file`.
pub async fn write_summary_file(
    output_root: &Path,
    video_stem: &str,
    produced: &[PathBuf],
) -> Result<PathBuf, MergeError> {
    let dir = output_root.join(video_stem);
    tokio::fs::create_dir_all(&dir).await?;
    let summary_path = dir.join(format!("{video_stem}_subtitle_info.txt"));

    let mut body = String::new();
    body.push_str("Video Subtitle Generation Summary\n");
    body.push_str("================================\n\n");
    body.push_str(&format!("Video: {video_stem}\n"));
    body.push_str(&format!("Output Directory: {}\n\n", dir.display()));
    body.push_str("Generated Files:\n");

    let mut sorted: Vec<&PathBuf> = produced.iter().collect();
    sorted.sort();
    for path in sorted {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        body.push_str(&format!("  - {name} ({size} bytes)\n"));
    }
    body.push_str(&format!("\nTotal Files: {}\n", produced.len()));
    body.push_str("\nNote: these subtitles were generated by an AI model and may require manual review.\n");

    tokio::fs::write(&summary_path, body).await?;
    Ok(summary_path)
}

/// Hindi's "dual-method" special case (§4.8): given every fragment for a
/// chunk×`hin` group (both `direct` and `translate` methods may be
/// present), keep `direct` when it exists, otherwise fall back to
/// `translate`. Every other language passes through unchanged since it
/// only ever has one fragment per chunk.
pub fn select_method(fragments: Vec<Fragment>) -> Vec<Fragment> {
    use std::collections::HashMap;

    let mut by_chunk: HashMap<u32, Vec<Fragment>> = HashMap::new();
    for fragment in fragments {
        by_chunk.entry(fragment.chunk_index).or_default().push(fragment);
    }

    let mut selected = Vec::with_capacity(by_chunk.len());
    for (_, mut candidates) in by_chunk {
        if candidates.len() == 1 {
            selected.push(candidates.pop().unwrap());
            continue;
        }
        let direct = candidates.iter().position(|f| f.method.as_deref() == Some("direct"));
        let chosen_index = direct
            .or_else(|| candidates.iter().position(|f| f.method.as_deref() == Some("translate")))
            .unwrap_or(0);
        selected.push(candidates.swap_remove(chosen_index));
    }
    selected.sort_by_key(|f| f.chunk_index);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use subgen_models::{GenerationFlags, LanguageCode};

    fn fragment(chunk_index: u32, content: &str) -> Fragment {
        let mut f = Fragment::new(chunk_index, LanguageCode::parse("eng").unwrap(), GenerationFlags::default());
        f.content = Some(content.to_string());
        f
    }

    const SAMPLE: &str = "1\n00:00:00,000 --> 00:00:02,000\nhello\n\n";

    #[test]
    fn parses_basic_srt_block() {
        let entries = parse_srt(SAMPLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_ms, 0);
        assert_eq!(entries[0].end_ms, 2000);
        assert_eq!(entries[0].text, "hello");
    }

    #[test]
    fn tolerates_dot_decimal_separator_and_crlf() {
        let content = "1\r\n00:00:01.500 --> 00:00:03.250\r\nhi\r\n\r\n";
        let entries = parse_srt(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_ms, 1500);
        assert_eq!(entries[0].end_ms, 3250);
    }

    #[test]
    fn skips_malformed_blocks_without_failing_the_whole_fragment() {
        let content = "garbage block\nwith no timing\n\n1\n00:00:00,000 --> 00:00:01,000\nok\n\n";
        let entries = parse_srt(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "ok");
    }

    #[test]
    fn merges_three_chunks_with_offsets_matching_scenario_one() {
        let fragments = vec![fragment(0, SAMPLE), fragment(1, SAMPLE), fragment(2, SAMPLE)];
        let track = merge_group("eng", &fragments, 60.0).unwrap();
        assert_eq!(track.entries.len(), 3);
        assert_eq!(track.entries[0].start_ms, 0);
        assert_eq!(track.entries[1].start_ms, 60_000);
        assert_eq!(track.entries[2].start_ms, 120_000);
        for (i, entry) in track.entries.iter().enumerate() {
            assert_eq!(entry.seq, i as u32 + 1);
        }
    }

    #[test]
    fn closes_micro_overlap_under_tolerance() {
        let frag0 = fragment(0, "1\n00:00:58,000 --> 00:01:00,000\na\n\n");
        let frag1 = fragment(1, "1\n00:00:00,000 --> 00:00:01,000\nb\n\n");
        // chunk 0 entry ends at 60_000ms; chunk 1 entry (offset 60_000ms)
        // starts at 60_000ms + some ms less due to model jitter below.
        let track = merge_group("eng", &[frag0, frag1], 60.0).unwrap();
        assert_eq!(track.entries[0].end_ms, track.entries[1].start_ms);
    }

    #[test]
    fn large_overlap_is_a_merge_error() {
        let frag0 = fragment(0, "1\n00:00:59,500 --> 00:01:05,000\na\n\n");
        let frag1 = fragment(1, "1\n00:00:00,000 --> 00:00:01,000\nb\n\n");
        let err = merge_group("eng", &[frag0, frag1], 60.0).unwrap_err();
        assert!(matches!(err, MergeError::Overlap { .. }));
    }

    #[test]
    fn last_shorter_chunk_still_yields_monotonic_track() {
        let frag0 = fragment(0, SAMPLE);
        let frag1 = fragment(1, "1\n00:00:00,000 --> 00:00:02,000\ntail\n\n");
        let track = merge_group("eng", &[frag0, frag1], 60.0).unwrap();
        assert!(subgen_models::track_is_valid(&track.entries));
    }

    #[test]
    fn serializes_srt_with_comma_and_vtt_with_dot_and_header() {
        let fragments = vec![fragment(0, SAMPLE)];
        let track = merge_group("eng", &fragments, 60.0).unwrap();
        let srt = serialize_srt(&track);
        assert!(srt.contains("00:00:00,000 --> 00:00:02,000"));
        let vtt = serialize_vtt(&track);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:02.000"));
    }

    #[test]
    fn select_method_prefers_direct_over_translate() {
        let mut direct = fragment(0, SAMPLE);
        direct.method = Some("direct".to_string());
        let mut translate = fragment(0, SAMPLE);
        translate.method = Some("translate".to_string());

        let selected = select_method(vec![translate, direct.clone()]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].method.as_deref(), Some("direct"));
    }

    #[test]
    fn select_method_falls_back_to_translate_when_direct_absent() {
        let mut translate = fragment(0, SAMPLE);
        translate.method = Some("translate".to_string());

        let selected = select_method(vec![translate]);
        assert_eq!(selected[0].method.as_deref(), Some("translate"));
    }

    #[test]
    fn empty_group_is_an_error() {
        let err = merge_group("eng", &[], 60.0).unwrap_err();
        assert!(matches!(err, MergeError::EmptyGroup { .. }));
    }

    proptest::proptest! {
        /// For any number of chunks each carrying one non-overlapping
        /// 1-second cue near the start of its in-chunk timeline, the merged
        /// track must stay dense and monotonic regardless of chunk count or
        /// chunk length (§8: "for every merged track T ...").
        #[test]
        fn merge_is_always_dense_and_monotonic(
            chunk_count in 1u32..12,
            chunk_duration_sec in 10f64..300.0,
            in_chunk_start_sec in 0f64..5.0,
        ) {
            let fragments: Vec<Fragment> = (0..chunk_count)
                .map(|i| {
                    let start = in_chunk_start_sec;
                    let end = start + 1.0;
                    let content = format!(
                        "1\n{} --> {}\nline {i}\n\n",
                        format_srt_timestamp((start * 1000.0) as u64),
                        format_srt_timestamp((end * 1000.0) as u64),
                    );
                    fragment(i, &content)
                })
                .collect();

            let track = merge_group("eng", &fragments, chunk_duration_sec).unwrap();
            proptest::prop_assert_eq!(track.entries.len(), chunk_count as usize);
            proptest::prop_assert!(subgen_models::track_is_valid(&track.entries));
            for (i, entry) in track.entries.iter().enumerate() {
                proptest::prop_assert_eq!(entry.seq, i as u32 + 1);
            }
        }
    }
}
