//! Query Planner (C7, §4.7).
//!
//! Person-prefix parsing is ported from `person_query_parser.py`'s
//! longest-name-first matching; language detection and lookup-intent
//! classification are authored directly from §4.7's literal rules since no
//! single original_source module covers them in isolation.

use hx_models::{Language, PersonId, PersonPrefix, QueryIntent};

/// A tenant's known persons, as the planner needs them for prefix parsing:
/// display name plus an optional precomputed query embedding.
pub struct PersonCandidate<'a> {
    pub id: &'a PersonId,
    pub display_name: &'a str,
    pub query_embedding: Option<&'a [f32]>,
}

/// Parse a leading person reference out of `query`, trying `person:<name>[,
/// rest]` first, then bare `<name> <rest>` with longest-name-first matching
/// so "J Lee" wins over "J" when both exist.
pub fn parse_person_prefix(query: &str, persons: &[PersonCandidate<'_>]) -> Option<PersonPrefix> {
    let lower = query.to_lowercase();

    if let Some(stripped) = lower.strip_prefix("person:") {
        let (name_part, rest) = split_on_comma(stripped);
        if let Some(person) = persons.iter().find(|p| p.display_name.to_lowercase() == name_part.trim()) {
            return Some(PersonPrefix {
                person_id: person.id.clone(),
                query_embedding: person.query_embedding.map(|v| v.to_vec()),
                rest: rest.trim().to_string(),
            });
        }
        return None;
    }

    let mut sorted_persons: Vec<&PersonCandidate> = persons.iter().collect();
    sorted_persons.sort_by_key(|p| std::cmp::Reverse(p.display_name.len()));

    for person in sorted_persons {
        let name_lower = person.display_name.to_lowercase();
        if !lower.starts_with(&name_lower) {
            continue;
        }
        let after = &query[name_lower.len()..];
        let Some(boundary_char) = after.chars().next() else {
            continue;
        };
        if boundary_char != ' ' && boundary_char != ',' {
            continue;
        }
        let rest = after.trim_start_matches([' ', ',']).trim();
        return Some(PersonPrefix {
            person_id: person.id.clone(),
            query_embedding: person.query_embedding.map(|v| v.to_vec()),
            rest: rest.to_string(),
        });
    }

    None
}

fn split_on_comma(s: &str) -> (&str, &str) {
    match s.split_once(',') {
        Some((name, rest)) => (name, rest),
        None => (s, ""),
    }
}

/// Hangul/CJK presence implies Korean; otherwise English (§4.7 step 2).
pub fn detect_language(query: &str) -> Language {
    let has_cjk = query.chars().any(|c| {
        let code = c as u32;
        (0xAC00..=0xD7A3).contains(&code) // Hangul syllables
            || (0x1100..=0x11FF).contains(&code) // Hangul Jamo
            || (0x4E00..=0x9FFF).contains(&code) // CJK unified ideographs
    });
    if has_cjk {
        Language::Korean
    } else {
        Language::English
    }
}

/// Lookup vs semantic intent classification (§4.7 step 3).
pub fn classify_intent(query: &str) -> QueryIntent {
    let trimmed = query.trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();

    let short_all_caps_free = tokens.len() <= 2 && tokens.iter().all(|t| t.chars().count() <= 6);

    let is_hangul_name = !tokens.is_empty()
        && !trimmed.contains(' ')
        && (2..=4).contains(&trimmed.chars().count())
        && trimmed.chars().all(|c| (0xAC00..=0xD7A3).contains(&(c as u32)));

    let has_uppercase_short = tokens.len() <= 2 && tokens.iter().any(|t| t.chars().any(|c| c.is_uppercase()));

    if short_all_caps_free || is_hangul_name || has_uppercase_short {
        QueryIntent::Lookup
    } else {
        QueryIntent::Semantic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(id: &'a PersonId, name: &'a str) -> PersonCandidate<'a> {
        PersonCandidate {
            id,
            display_name: name,
            query_embedding: None,
        }
    }

    #[test]
    fn person_prefix_pattern_strips_name_and_comma() {
        let id = PersonId::from_string("p1");
        let persons = vec![candidate(&id, "J Lee")];
        let result = parse_person_prefix("person:j lee, doing pushups", &persons).unwrap();
        assert_eq!(result.person_id, id);
        assert_eq!(result.rest, "doing pushups");
    }

    #[test]
    fn bare_name_at_start_with_space_matches() {
        let id = PersonId::from_string("p1");
        let persons = vec![candidate(&id, "J Lee")];
        let result = parse_person_prefix("j lee doing pushups", &persons).unwrap();
        assert_eq!(result.rest, "doing pushups");
    }

    #[test]
    fn colon_is_not_a_word_boundary() {
        let id = PersonId::from_string("p1");
        let persons = vec![candidate(&id, "J Lee")];
        assert!(parse_person_prefix("j lee: doing pushups", &persons).is_none());
    }

    #[test]
    fn longest_name_wins_over_prefix_collision() {
        let j_id = PersonId::from_string("j");
        let john_id = PersonId::from_string("john-smith");
        let persons = vec![candidate(&j_id, "John"), candidate(&john_id, "John Smith")];
        let result = parse_person_prefix("john smith running", &persons).unwrap();
        assert_eq!(result.person_id, john_id);
        assert_eq!(result.rest, "running");
    }

    #[test]
    fn unknown_name_leaves_query_untouched() {
        let id = PersonId::from_string("p1");
        let persons = vec![candidate(&id, "J Lee")];
        assert!(parse_person_prefix("person:unknown, doing pushups", &persons).is_none());
    }

    #[test]
    fn korean_text_detected_as_korean() {
        assert_eq!(detect_language("이장원 영상 찾아줘"), Language::Korean);
    }

    #[test]
    fn ascii_text_detected_as_english() {
        assert_eq!(detect_language("find the video"), Language::English);
    }

    #[test]
    fn short_query_classified_as_lookup() {
        assert_eq!(classify_intent("Yuna"), QueryIntent::Lookup);
    }

    #[test]
    fn long_sentence_classified_as_semantic() {
        assert_eq!(
            classify_intent("show me the part where they discuss the budget"),
            QueryIntent::Semantic
        );
    }

    #[test]
    fn hangul_name_without_spaces_is_lookup() {
        assert_eq!(classify_intent("이장원"), QueryIntent::Lookup);
    }
}
