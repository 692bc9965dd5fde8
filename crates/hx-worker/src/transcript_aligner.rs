//! Transcript Aligner (C4, §4.4): maps whole-video transcript segments onto
//! a single scene's time window, with a symmetric context-pad retry when the
//! strict overlap falls under the configured minimum character floor.

use hx_ml_client::contracts::TranscriptSegment;

/// Collapse consecutive whitespace runs to a single space and trim the ends.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

fn overlaps(segment: &TranscriptSegment, window_start: f64, window_end: f64) -> bool {
    segment.start_s < window_end && segment.end_s > window_start
}

/// Concatenate every segment overlapping `[window_start, window_end)`, in
/// ascending `start_s` order (segment order from the transcriber is not
/// trusted per §4.4).
fn concat_overlapping(segments: &[TranscriptSegment], window_start: f64, window_end: f64) -> String {
    let mut ordered: Vec<&TranscriptSegment> = segments
        .iter()
        .filter(|s| overlaps(s, window_start, window_end))
        .collect();
    ordered.sort_by(|a, b| {
        a.start_s
            .partial_cmp(&b.start_s)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let joined = ordered
        .into_iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&joined)
}

/// Align the transcript to one scene's window (§4.4).
///
/// If the strict-window result has fewer than `min_char_floor` characters,
/// retry once with the window symmetrically padded by `context_pad_s` on
/// each side, clamped to `[0, video_duration_s]`. Returns `None` if even the
/// padded attempt stays under the floor (the scene keeps no transcript text
/// and must fall back to other channels, §4.6).
pub fn align_scene_transcript(
    segments: &[TranscriptSegment],
    scene_start_s: f64,
    scene_end_s: f64,
    video_duration_s: f64,
    min_char_floor: usize,
    context_pad_s: f64,
) -> Option<String> {
    let strict = concat_overlapping(segments, scene_start_s, scene_end_s);
    if strict.chars().count() >= min_char_floor {
        return Some(strict);
    }

    let padded_start = (scene_start_s - context_pad_s).max(0.0);
    let padded_end = (scene_end_s + context_pad_s).min(video_duration_s);
    let padded = concat_overlapping(segments, padded_start, padded_end);
    if padded.chars().count() >= min_char_floor {
        return Some(padded);
    }

    if !strict.is_empty() {
        return Some(strict);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_s: f64, end_s: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_s,
            end_s,
            text: text.to_string(),
            no_speech_prob: 0.05,
        }
    }

    #[test]
    fn strict_window_concatenates_overlapping_segments_in_order() {
        let segments = vec![
            seg(5.0, 7.0, "second."),
            seg(0.0, 2.0, "first."),
            seg(10.0, 12.0, "outside."),
        ];
        let result = align_scene_transcript(&segments, 0.0, 8.0, 100.0, 5, 1.5).unwrap();
        assert_eq!(result, "first. second.");
    }

    #[test]
    fn short_strict_window_retries_with_context_pad() {
        let segments = vec![seg(0.0, 1.0, "hi"), seg(1.5, 2.5, "there friend")];
        // Strict window [1.0, 1.4) catches nothing; pad to [-0.5, 2.9) clamped
        // to [0.0, 2.9) which catches both segments.
        let result = align_scene_transcript(&segments, 1.0, 1.4, 100.0, 5, 1.5).unwrap();
        assert!(result.contains("hi") || result.contains("there"));
    }

    #[test]
    fn pad_is_clamped_to_video_bounds() {
        let segments = vec![seg(0.0, 1.0, "start of video")];
        let result = align_scene_transcript(&segments, 0.0, 0.3, 10.0, 5, 5.0);
        assert_eq!(result, Some("start of video".to_string()));
    }

    #[test]
    fn whitespace_is_normalized() {
        let segments = vec![seg(0.0, 2.0, "  hello\n\tworld  ")];
        let result = align_scene_transcript(&segments, 0.0, 2.0, 10.0, 1, 1.0).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn no_overlap_anywhere_returns_none() {
        let segments = vec![seg(50.0, 51.0, "far away")];
        let result = align_scene_transcript(&segments, 0.0, 1.0, 100.0, 5, 1.0);
        assert_eq!(result, None);
    }

    #[test]
    fn sub_floor_result_with_no_padded_improvement_returns_best_effort() {
        let segments = vec![seg(0.0, 1.0, "hi")];
        // Floor is high enough that neither strict nor padded window meets
        // it, but some text did overlap, so it's still returned.
        let result = align_scene_transcript(&segments, 0.0, 1.0, 100.0, 50, 0.5);
        assert_eq!(result, Some("hi".to_string()));
    }
}
