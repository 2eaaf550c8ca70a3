//! Scoring of OCR text candidates against a free-text prompt
//!
//! Tiers: exact 1.0, whole word 0.85, substring 0.70, then
//! `0.40 + 0.60 * similarity` when fuzzy matching is on. Candidates are ranked
//! by tier first and score second, so an edit-distance match never outranks
//! an exact or containment match even when its numeric score is higher.

use crate::platforms::OcrWord;
use crate::types::Rect;

pub const SCORE_EXACT: f64 = 1.0;
pub const SCORE_WHOLE_WORD: f64 = 0.85;
pub const SCORE_SUBSTRING: f64 = 0.70;
pub const FUZZY_BASE: f64 = 0.40;
pub const FUZZY_SPAN: f64 = 0.60;

/// Lowercase, collapse every non-alphanumeric run to one space, trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Normalises a prompt and drops a leading "click " phrasing artifact.
pub fn normalize_prompt(prompt: &str) -> String {
    let norm = normalize(prompt);
    match norm.strip_prefix("click ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => norm,
    }
}

/// Classic Levenshtein distance over chars with unit costs.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            cur[j + 1] = substitute.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// `1 - distance / max(len)` over normalised strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

/// Which rule produced a score. Ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    None,
    Fuzzy,
    Substring,
    WholeWord,
    Exact,
}

/// Scores one candidate against a prompt, both given raw.
pub fn score(candidate: &str, prompt: &str, fuzzy: bool) -> f64 {
    score_normalized(&normalize(candidate), &normalize_prompt(prompt), fuzzy).1
}

fn score_normalized(candidate: &str, prompt: &str, fuzzy: bool) -> (MatchTier, f64) {
    if candidate.is_empty() || prompt.is_empty() {
        return (MatchTier::None, 0.0);
    }
    if candidate == prompt {
        return (MatchTier::Exact, SCORE_EXACT);
    }
    if format!(" {candidate} ").contains(&format!(" {prompt} ")) {
        return (MatchTier::WholeWord, SCORE_WHOLE_WORD);
    }
    if candidate.contains(prompt) {
        return (MatchTier::Substring, SCORE_SUBSTRING);
    }
    if fuzzy {
        return (
            MatchTier::Fuzzy,
            FUZZY_BASE + FUZZY_SPAN * similarity(candidate, prompt),
        );
    }
    (MatchTier::None, 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    pub index: usize,
    pub score: f64,
    pub tier: MatchTier,
}

/// Best candidate scoring at least `min_score`, ranked by tier then score.
/// Earlier candidates win ties.
pub fn best_match<'a, I>(
    candidates: I,
    prompt: &str,
    min_score: f64,
    fuzzy: bool,
) -> Option<FuzzyMatch>
where
    I: IntoIterator<Item = &'a str>,
{
    let prompt = normalize_prompt(prompt);
    if prompt.is_empty() {
        return None;
    }
    let mut best: Option<FuzzyMatch> = None;
    for (index, candidate) in candidates.into_iter().enumerate() {
        let (tier, s) = score_normalized(&normalize(candidate), &prompt, fuzzy);
        if tier == MatchTier::None || s < min_score {
            continue;
        }
        if best.is_none_or(|b| (tier, s) > (b.tier, b.score)) {
            best = Some(FuzzyMatch {
                index,
                score: s,
                tier,
            });
        }
    }
    best
}

/// Words plus runs of up to `max_words` neighbouring words on the same text
/// line, merged into phrase boxes. Lets "save as" match two OCR words.
pub fn phrase_candidates(words: &[OcrWord], max_words: usize) -> Vec<OcrWord> {
    let mut out: Vec<OcrWord> = words.to_vec();
    if max_words < 2 {
        return out;
    }
    for start in 0..words.len() {
        let mut text = words[start].text.clone();
        let mut bounds = words[start].bounds;
        for next in words.iter().skip(start + 1).take(max_words - 1) {
            if !same_line(&bounds, &next.bounds) {
                break;
            }
            text.push(' ');
            text.push_str(&next.text);
            bounds = bounds.union(&next.bounds);
            out.push(OcrWord {
                text: text.clone(),
                bounds,
            });
        }
    }
    out
}

fn same_line(a: &Rect, b: &Rect) -> bool {
    let a_mid = a.y + a.height / 2;
    let b_mid = b.y + b.height / 2;
    let tolerance = a.height.max(b.height) / 2;
    (a_mid - b_mid).abs() <= tolerance && b.x >= a.x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Save  As...  "), "save as");
        assert_eq!(normalize("File->Open"), "file open");
        assert_eq!(normalize("--"), "");
        assert_eq!(normalize_prompt("Click the OK button"), "the ok button");
        assert_eq!(normalize_prompt("click"), "click");
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(score("OK", "OK", true), 1.0);
        assert_eq!(score("Cancel", "cancel", true), 1.0);
        assert_eq!(score("ok button", "ok", true), 0.85);
        assert_eq!(score("Submitted", "submit", true), 0.70);
        assert_eq!(score("Submitted", "xyz", false), 0.0);
        // distance 2 over 6 chars: 0.40 + 0.60 * (4 / 6)
        let fuzzy = score("Cancle", "Cancel", true);
        assert!((fuzzy - 0.8).abs() < 1e-9, "got {fuzzy}");
    }

    #[test]
    fn test_fuzzy_never_outranks_containment() {
        // "setings" scores 0.925 by edit distance, above the whole-word 0.85
        let candidates = ["setings", "settings menu"];
        assert!(score(candidates[0], "settings", true) > SCORE_WHOLE_WORD);
        let m = best_match(candidates, "settings", 0.0, true).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.tier, MatchTier::WholeWord);
        assert_eq!(m.score, SCORE_WHOLE_WORD);
    }

    #[test]
    fn test_best_match_threshold() {
        let candidates = ["alpha", "beta"];
        assert!(best_match(candidates, "gamma", 0.9, true).is_none());
        assert!(best_match(candidates, "   ", 0.0, true).is_none());
    }

    #[test]
    fn test_phrase_candidates_merge_same_line() {
        let words = vec![
            OcrWord {
                text: "Save".to_string(),
                bounds: Rect::new(10, 10, 30, 12),
            },
            OcrWord {
                text: "As".to_string(),
                bounds: Rect::new(45, 11, 15, 12),
            },
            OcrWord {
                text: "Next".to_string(),
                bounds: Rect::new(10, 60, 30, 12),
            },
        ];
        let phrases = phrase_candidates(&words, 3);
        let merged = phrases.iter().find(|w| w.text == "Save As").unwrap();
        assert_eq!(merged.bounds, Rect::new(10, 10, 50, 13));
        assert!(!phrases.iter().any(|w| w.text.contains("As Next")));
    }
}
