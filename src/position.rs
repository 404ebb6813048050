//! Position tracking: sentence segmentation and mention offsets
//!
//! Maps every entity mention to its sentence index, paragraph index, and
//! character offsets within the article text. Mention scanning uses an
//! Aho-Corasick automaton over all entity forms (ASCII case folding keeps
//! byte offsets valid against the original text); sentence boundaries
//! come from UAX #29 with a heuristic splitter as fallback.

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::CoreResult;
use crate::types::{Fact, Mention};

// =============================================================================
// Sentence segmentation
// =============================================================================

/// Which sentence boundary detector to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterMode {
    /// UAX #29 sentence boundaries via unicode-segmentation
    Unicode,
    /// Punctuation-driven splitter with abbreviation guards
    Heuristic,
}

impl Default for SegmenterMode {
    fn default() -> Self {
        SegmenterMode::Unicode
    }
}

/// Splits text into ordered `(start, end, text)` triples with contiguous,
/// non-overlapping ranges covering the whole input.
pub struct SentenceSegmenter {
    mode: SegmenterMode,
    boundary: Regex,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(SegmenterMode::default())
    }
}

impl SentenceSegmenter {
    pub fn new(mode: SegmenterMode) -> Self {
        Self {
            mode,
            // Candidate boundary: terminal punctuation plus the
            // whitespace run after it
            boundary: Regex::new(r"[.!?]\s+").expect("static sentence boundary pattern"),
        }
    }

    pub fn segment<'a>(&self, text: &'a str) -> Vec<(usize, usize, &'a str)> {
        match self.mode {
            SegmenterMode::Unicode => text
                .split_sentence_bound_indices()
                .map(|(start, sentence)| (start, start + sentence.len(), sentence))
                .collect(),
            SegmenterMode::Heuristic => self.segment_heuristic(text),
        }
    }

    /// Splits after `[.!?]\s+` with two exceptions: never after a
    /// single-letter initial ("J.") and never after a title-like
    /// abbreviation ("Dr.", "Mr.").
    fn segment_heuristic<'a>(&self, text: &'a str) -> Vec<(usize, usize, &'a str)> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.boundary.find_iter(text) {
            if text.as_bytes()[m.start()] == b'.'
                && (is_initial(text, m.start()) || is_title_abbreviation(text, m.start()))
            {
                continue;
            }
            sentences.push((start, m.end(), &text[start..m.end()]));
            start = m.end();
        }

        if start < text.len() {
            sentences.push((start, text.len(), &text[start..]));
        }

        sentences
    }
}

/// True when the period at `period_idx` terminates a single-letter token
fn is_initial(text: &str, period_idx: usize) -> bool {
    let mut before = text[..period_idx].chars().rev();
    match before.next() {
        Some(c) if is_word_char(c) => match before.next() {
            Some(prev) => !is_word_char(prev),
            None => true,
        },
        _ => false,
    }
}

/// True when the period at `period_idx` follows an `[A-Z][a-z]` pair
fn is_title_abbreviation(text: &str, period_idx: usize) -> bool {
    let mut before = text[..period_idx].chars().rev();
    matches!(
        (before.next(), before.next()),
        (Some(low), Some(up)) if low.is_lowercase() && up.is_uppercase()
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// =============================================================================
// Position tracking
// =============================================================================

/// Attaches sentence/paragraph indices and char offsets to entity facts
pub struct PositionTracker {
    segmenter: SentenceSegmenter,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(SentenceSegmenter::default())
    }
}

impl PositionTracker {
    pub fn new(segmenter: SentenceSegmenter) -> Self {
        Self { segmenter }
    }

    pub fn segmenter(&self) -> &SentenceSegmenter {
        &self.segmenter
    }

    /// Enrich facts with their first occurrence and return every
    /// occurrence as a mention list
    ///
    /// Each fact receives the position of the first case-insensitive
    /// occurrence of its form; facts whose form never occurs keep null
    /// positions and produce no mentions, which excludes them from the
    /// proximity matrix downstream.
    pub fn enrich(&self, text: &str, facts: &mut [Fact]) -> CoreResult<Vec<Mention>> {
        let per_fact = self.scan_occurrences(text, facts)?;
        let sentences = self.segmenter.segment(text);

        let mut mentions = Vec::new();

        for (fact_idx, occurrences) in per_fact.iter().enumerate() {
            let fact = &mut facts[fact_idx];

            if occurrences.is_empty() {
                if !fact.form.is_empty() {
                    warn!(article_id = fact.article_id, entity = %fact.form,
                          "entity not found in article text");
                }
                fact.sentence_index = None;
                fact.paragraph_index = None;
                fact.char_start = None;
                fact.char_end = None;
                continue;
            }

            for &(char_start, char_end) in occurrences {
                let Some(sentence_index) = sentence_index_at(&sentences, char_start) else {
                    continue;
                };
                mentions.push(Mention {
                    form: fact.form.clone(),
                    entity_type: fact.entity_type,
                    confidence: fact.confidence,
                    sentence_index,
                    paragraph_index: paragraph_index_at(text, char_start),
                    char_start,
                    char_end,
                });
            }

            // First occurrence becomes the fact's own position
            let (first_start, first_end) = occurrences[0];
            if let Some(sentence_index) = sentence_index_at(&sentences, first_start) {
                fact.sentence_index = Some(sentence_index);
                fact.paragraph_index = Some(paragraph_index_at(text, first_start));
                fact.char_start = Some(first_start);
                fact.char_end = Some(first_end);
            }
        }

        mentions.sort_by(|a, b| {
            a.char_start
                .cmp(&b.char_start)
                .then_with(|| a.form.cmp(&b.form))
        });

        Ok(mentions)
    }

    /// All occurrences per fact, ordered by start offset
    fn scan_occurrences(&self, text: &str, facts: &[Fact]) -> CoreResult<Vec<Vec<(usize, usize)>>> {
        let mut per_fact: Vec<Vec<(usize, usize)>> = vec![Vec::new(); facts.len()];

        let mut patterns = Vec::new();
        let mut pattern_fact = Vec::new();
        for (idx, fact) in facts.iter().enumerate() {
            if fact.form.is_empty() {
                continue;
            }
            patterns.push(fact.form.as_str());
            pattern_fact.push(idx);
        }

        if patterns.is_empty() || text.is_empty() {
            return Ok(per_fact);
        }

        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&patterns)?;

        for m in automaton.find_overlapping_iter(text) {
            let fact_idx = pattern_fact[m.pattern().as_usize()];
            per_fact[fact_idx].push((m.start(), m.end()));
        }

        for occurrences in &mut per_fact {
            occurrences.sort_unstable();
            occurrences.dedup();
        }

        Ok(per_fact)
    }
}

/// Index of the sentence whose half-open range contains `char_start`
fn sentence_index_at(sentences: &[(usize, usize, &str)], char_start: usize) -> Option<usize> {
    sentences
        .iter()
        .position(|&(start, end, _)| start <= char_start && char_start < end)
}

/// Count of `\n\n` boundaries strictly before `char_start`
fn paragraph_index_at(text: &str, char_start: usize) -> usize {
    text[..char_start].matches("\n\n").count()
}

// =============================================================================
// Tests
// =============================================================================
