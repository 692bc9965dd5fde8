//! Visual-intent routing (C7 step 4, §4.7).
//!
//! Heuristic bilingual (English + Korean) keyword/phrase matcher that
//! decides whether a query reads as visual ("show me the red car"), speech
//! ("what did she say about"), or mixed, and proposes a suggested visual
//! mode plus a weight adjustment. Ported from `visual_router.py`'s
//! `VisualIntentRouter`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use hx_models::{VisualIntent, VisualMode};

static VISUAL_OBJECTS: &[&str] = &[
    "person", "people", "man", "woman", "child", "face", "hand", "body", "car", "vehicle",
    "truck", "bus", "bike", "motorcycle", "building", "house", "room", "door", "window", "wall",
    "sign", "logo", "text", "banner", "poster", "food", "plate", "cup", "bottle", "table", "chair",
    "tree", "flower", "sky", "water", "mountain", "landscape", "animal", "dog", "cat", "bird",
    "horse", "phone", "computer", "screen", "camera", "book", "clothes", "shirt", "dress", "hat",
    "shoes", "crowd", "group", "audience", "meeting", "떡볶이", "tteokbokki", "김치", "kimchi",
    "비빔밥", "bibimbap", "불고기", "bulgogi", "삼겹살", "samgyeopsal", "치킨", "chicken",
];

static VISUAL_ACTIONS: &[&str] = &[
    "walking", "running", "sitting", "standing", "jumping", "dancing", "talking", "speaking",
    "laughing", "crying", "smiling", "frowning", "eating", "drinking", "cooking", "working",
    "playing", "driving", "riding", "flying", "swimming", "climbing", "opening", "closing",
    "pointing", "waving", "holding", "looking", "watching", "staring", "gazing", "glancing",
    "moving", "entering", "leaving", "arriving", "departing", "fighting", "hugging", "kissing",
    "shaking", "clapping",
];

static VISUAL_ATTRIBUTES: &[&str] = &[
    "red", "blue", "green", "yellow", "orange", "purple", "pink", "brown", "black", "white",
    "gray", "grey", "colorful", "bright", "dark", "blurry", "sharp", "clear", "foggy", "dim",
    "shadowy", "close-up", "closeup", "wide", "zoomed", "zoom", "pan", "tilt", "indoor", "outdoor",
    "day", "night", "sunset", "sunrise", "big", "small", "large", "tiny", "huge", "massive",
    "beautiful", "ugly", "pretty", "handsome", "attractive", "shot", "angle", "view", "scene",
    "frame", "background", "foreground",
];

static VISUAL_PHRASES: &[&str] = &[
    "what does it look like",
    "show me scenes with",
    "show me",
    "find scenes with",
    "scenes where",
    "video of",
    "footage of",
    "clip of",
    "appearance of",
    "looks like",
    "wearing",
    "dressed in",
    "in the background",
    "in the foreground",
];

static SPEECH_KEYWORDS: &[&str] = &[
    "says", "said", "mentions", "mentioned", "talks about", "talked about", "discusses",
    "discussed", "explains", "explained", "quote", "quotes", "line", "dialogue", "conversation",
    "tells", "told", "asks", "asked", "answers", "answered", "announces", "announced", "declares",
    "declared", "words", "phrase", "sentence", "spoken", "verbal",
];

static SPEECH_PHRASES: &[&str] = &[
    "he says",
    "she says",
    "they say",
    "the line where",
    "when he says",
    "when she says",
    "the part where",
    "the quote",
    "what they said",
    "what he said",
    "what she said",
];

static QUOTE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"“”‘’]"#).unwrap());
static QUESTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(what|who|when|where|why|how|which|whose|whom)\s+").unwrap()
});
static PUNCTUATION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn analyze(query: &str) -> VisualIntent {
    if query.trim().is_empty() {
        return VisualIntent {
            suggested_mode: VisualMode::Skip,
            weight_adjustment: 0.0,
            confidence: 0.0,
        };
    }

    let query_lower = query.to_lowercase();
    let query_normalized = normalize_query(&query_lower);

    let visual_terms = match_terms(
        &query_lower,
        &query_normalized,
        VISUAL_PHRASES,
        &[VISUAL_OBJECTS, VISUAL_ACTIONS, VISUAL_ATTRIBUTES],
    );
    let mut speech_terms = match_terms(&query_lower, &query_normalized, SPEECH_PHRASES, &[SPEECH_KEYWORDS]);

    if QUOTE_PATTERN.is_match(query) {
        speech_terms.push("contains_quotes".to_string());
    }
    let is_long_question =
        query.split_whitespace().count() > 6 && QUESTION_PATTERN.is_match(query);
    if is_long_question {
        speech_terms.push("long_question".to_string());
    }

    let visual_score = visual_terms.len();
    let speech_score = speech_terms.len();

    let (suggested_mode, weight_adjustment, confidence) =
        classify(visual_score, speech_score);

    VisualIntent {
        suggested_mode,
        weight_adjustment,
        confidence,
    }
}

fn classify(visual_score: usize, speech_score: usize) -> (VisualMode, f64, f64) {
    if visual_score >= 3 && speech_score == 0 {
        (VisualMode::Recall, 0.15, 0.9)
    } else if visual_score >= 2 && speech_score <= 1 {
        (VisualMode::Rerank, 0.05, 0.7)
    } else if visual_score >= 1 && speech_score == 0 {
        (VisualMode::Rerank, 0.0, 0.5)
    } else if speech_score >= 2 && visual_score == 0 {
        (VisualMode::Skip, -0.20, 0.9)
    } else if speech_score >= 1 && visual_score == 0 {
        (VisualMode::Skip, -0.10, 0.7)
    } else if visual_score > 0 && speech_score > 0 {
        if visual_score > speech_score {
            (VisualMode::Rerank, 0.0, 0.4)
        } else {
            (VisualMode::Rerank, -0.05, 0.4)
        }
    } else {
        (VisualMode::Rerank, 0.0, 0.3)
    }
}

fn normalize_query(query_lower: &str) -> String {
    let no_punct = PUNCTUATION_PATTERN.replace_all(query_lower, " ");
    WHITESPACE_PATTERN.replace_all(&no_punct, " ").trim().to_string()
}

fn match_terms(
    query_lower: &str,
    query_normalized: &str,
    phrases: &[&str],
    word_lists: &[&[&str]],
) -> Vec<String> {
    let mut matched = Vec::new();
    for &phrase in phrases {
        if query_lower.contains(phrase) {
            matched.push(format!("phrase:{phrase}"));
        }
    }
    let words: HashSet<&str> = query_normalized.split(' ').collect();
    for &list in word_lists {
        for &term in list {
            if words.contains(term) || query_normalized.contains(term) {
                matched.push(format!("term:{term}"));
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_skips_with_zero_confidence() {
        let result = analyze("   ");
        assert_eq!(result.suggested_mode, VisualMode::Skip);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn strong_visual_signal_recommends_recall() {
        let result = analyze("show me a red car driving on the street");
        assert_eq!(result.suggested_mode, VisualMode::Recall);
        assert!(result.weight_adjustment > 0.0);
    }

    #[test]
    fn strong_speech_signal_recommends_skip() {
        let result = analyze("what did she say and what did he mention in the conversation");
        assert_eq!(result.suggested_mode, VisualMode::Skip);
        assert!(result.weight_adjustment < 0.0);
    }

    #[test]
    fn quotes_count_as_speech_signal() {
        let result = analyze(r#"find the part where he says "hello""#);
        assert_eq!(result.suggested_mode, VisualMode::Skip);
    }

    #[test]
    fn no_signals_defaults_to_low_confidence_rerank() {
        let result = analyze("xyzzy plugh");
        assert_eq!(result.suggested_mode, VisualMode::Rerank);
        assert_eq!(result.weight_adjustment, 0.0);
        assert_eq!(result.confidence, 0.3);
    }

    #[test]
    fn bilingual_korean_food_term_is_recognized_as_visual() {
        let result = analyze("떡볶이 먹는 장면 보여줘");
        assert!(result.confidence > 0.0);
    }
}
