//! Transcription quality gate (§4.4, sits between the transcriber and C4).
//!
//! A transcript is accepted only if it reads as actual speech rather than
//! background music, silence, or a canned outro. Authored directly from
//! §4.4's four-part rule; no single original_source module covers all four
//! checks as one function.

use hx_ml_client::contracts::{TranscriptSegment, TranscriptionResult};

use crate::config::WorkerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    TooShort,
    HighNoSpeechProbability,
    TooFewSpeechSegments,
    MusicOrBannedPhraseDominated,
}

#[derive(Debug, Clone)]
pub struct QualityGateResult {
    pub has_speech: bool,
    pub reason: Option<RejectionReason>,
}

impl QualityGateResult {
    fn accepted() -> Self {
        Self {
            has_speech: true,
            reason: None,
        }
    }

    fn rejected(reason: RejectionReason) -> Self {
        Self {
            has_speech: false,
            reason: Some(reason),
        }
    }
}

/// Count of letters/digits/Hangul/CJK characters, the "speech-char" count
/// used for the length-or-ratio check (§4.4 (a)).
fn speech_char_count(text: &str) -> usize {
    text.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || (0xAC00..=0xD7A3).contains(&(*c as u32))
                || (0x4E00..=0x9FFF).contains(&(*c as u32))
        })
        .count()
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// A segment counts as "speech" iff its own no-speech probability is below
/// the configured ceiling.
fn is_speech_segment(segment: &TranscriptSegment, config: &WorkerConfig) -> bool {
    segment.no_speech_prob < config.transcription_max_no_speech_prob
}

fn is_dominated_by_markers_or_banned_phrases(text: &str, config: &WorkerConfig) -> bool {
    let lower = text.to_lowercase();
    let marker_hits = config
        .transcription_music_markers
        .iter()
        .filter(|m| lower.contains(&m.to_lowercase()))
        .count();
    if marker_hits > 0 && speech_char_count(text) < config.transcription_min_chars_for_speech {
        return true;
    }
    config
        .transcription_banned_phrases
        .iter()
        .any(|p| lower.contains(&p.to_lowercase()))
}

/// Run the quality gate over a raw transcription result (§4.4).
pub fn evaluate(result: &TranscriptionResult, config: &WorkerConfig) -> QualityGateResult {
    let total_chars = result.text.chars().count();
    let speech_chars = speech_char_count(&result.text);
    let ratio = if total_chars == 0 {
        0.0
    } else {
        speech_chars as f64 / total_chars as f64
    };

    let length_ok = speech_chars >= config.transcription_min_chars_for_speech
        || ratio >= config.transcription_min_speech_char_ratio;
    if !length_ok {
        return QualityGateResult::rejected(RejectionReason::TooShort);
    }

    if !result.segments.is_empty() {
        let no_speech_probs: Vec<f64> = result.segments.iter().map(|s| s.no_speech_prob).collect();
        if median(no_speech_probs) >= config.transcription_max_no_speech_prob {
            return QualityGateResult::rejected(RejectionReason::HighNoSpeechProbability);
        }

        let speech_segments = result
            .segments
            .iter()
            .filter(|s| is_speech_segment(s, config))
            .count();
        let speech_ratio = speech_segments as f64 / result.segments.len() as f64;
        if speech_ratio < config.transcription_min_speech_segments_ratio {
            return QualityGateResult::rejected(RejectionReason::TooFewSpeechSegments);
        }
    }

    if is_dominated_by_markers_or_banned_phrases(&result.text, config) {
        return QualityGateResult::rejected(RejectionReason::MusicOrBannedPhraseDominated);
    }

    QualityGateResult::accepted()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, no_speech_prob: f64) -> TranscriptSegment {
        TranscriptSegment {
            start_s: 0.0,
            end_s: 1.0,
            text: text.to_string(),
            no_speech_prob,
        }
    }

    #[test]
    fn short_transcript_with_low_ratio_is_rejected() {
        let config = WorkerConfig::default();
        let result = TranscriptionResult {
            text: "uh".to_string(),
            segments: vec![segment("uh", 0.1)],
        };
        let gate = evaluate(&result, &config);
        assert!(!gate.has_speech);
        assert_eq!(gate.reason, Some(RejectionReason::TooShort));
    }

    #[test]
    fn rich_speech_transcript_is_accepted() {
        let config = WorkerConfig::default();
        let text = "Today we are going to talk about how to fix the engine properly.";
        let result = TranscriptionResult {
            text: text.to_string(),
            segments: vec![segment(text, 0.05)],
        };
        let gate = evaluate(&result, &config);
        assert!(gate.has_speech);
        assert_eq!(gate.reason, None);
    }

    #[test]
    fn high_median_no_speech_probability_is_rejected() {
        let config = WorkerConfig::default();
        let text = "This is a reasonably long segment of text that passes the length check.";
        let result = TranscriptionResult {
            text: text.to_string(),
            segments: vec![segment(text, 0.95), segment(text, 0.92)],
        };
        let gate = evaluate(&result, &config);
        assert_eq!(gate.reason, Some(RejectionReason::HighNoSpeechProbability));
    }

    #[test]
    fn music_marker_dominated_short_transcript_is_rejected() {
        let config = WorkerConfig::default();
        let result = TranscriptionResult {
            text: "[music playing]".to_string(),
            segments: vec![segment("[music playing]", 0.2)],
        };
        let gate = evaluate(&result, &config);
        assert_eq!(
            gate.reason,
            Some(RejectionReason::MusicOrBannedPhraseDominated)
        );
    }

    #[test]
    fn banned_outro_phrase_is_rejected_even_if_long_enough() {
        let config = WorkerConfig::default();
        let text = "Don't forget to like and subscribe to my channel for more great videos!";
        let result = TranscriptionResult {
            text: text.to_string(),
            segments: vec![segment(text, 0.1)],
        };
        let gate = evaluate(&result, &config);
        assert_eq!(
            gate.reason,
            Some(RejectionReason::MusicOrBannedPhraseDominated)
        );
    }
}
