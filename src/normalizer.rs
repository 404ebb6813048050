//! Entity normalization and per-article fact deduplication
//!
//! Canonicalizes surface variants of the same referent ("Mayor Mike
//! Doenges", "Rutland City Mayor Mike Doenges", "Mike Doenges") and
//! merges the duplicate fact records an extraction ensemble produces.

use crate::types::{EntityType, Fact};

/// Honorifics and titles stripped from the front of PERSON names.
/// Matching is case-insensitive and tolerates a trailing period.
const TITLES: &[&str] = &[
    "mayor",
    "governor",
    "senator",
    "sen",
    "representative",
    "rep",
    "president",
    "congressman",
    "congresswoman",
    "judge",
    "justice",
    "sheriff",
    "chief",
    "commissioner",
    "secretary",
    "mr",
    "mrs",
    "ms",
    "dr",
    "prof",
    "professor",
];

// =============================================================================
// Normalization
// =============================================================================

/// Canonicalize an entity surface form for its type
///
/// PERSON forms lose a leading `<City> City?` prefix and any stacked
/// leading titles; ORGANIZATION forms lose a leading "the "; everything
/// else passes through unchanged. Remaining casing is preserved and
/// whitespace is collapsed. Idempotent: normalizing a normalized form is
/// a no-op.
pub fn normalize(form: &str, entity_type: EntityType) -> String {
    if form.is_empty() {
        return String::new();
    }

    match entity_type {
        EntityType::Person => normalize_person(form),
        EntityType::Organization => normalize_organization(form),
        _ => form.to_string(),
    }
}

/// True when two forms plausibly name the same referent: identical types
/// and one canonical form a case-insensitive substring of the other.
/// Symmetric and reflexive.
pub fn equivalent(a: &str, b: &str, type_a: EntityType, type_b: EntityType) -> bool {
    if type_a != type_b {
        return false;
    }

    let ca = normalize(a, type_a).to_lowercase();
    let cb = normalize(b, type_b).to_lowercase();

    ca.contains(&cb) || cb.contains(&ca)
}

fn normalize_person(form: &str) -> String {
    let mut tokens: Vec<&str> = form.split_whitespace().collect();

    // Leading "<City> City? <Title>" prefix: a non-title word (plus an
    // optional literal "City") is only dropped when a title follows it.
    if tokens.len() >= 2 && leading_title_len(&tokens) == 0 {
        let mut k = 1;
        if tokens.len() > k && clean(tokens[k]) == "city" {
            k += 1;
        }
        if tokens.len() > k && leading_title_len(&tokens[k..]) > 0 {
            tokens.drain(..k);
        }
    }

    // Stacked leading honorifics: "Senator Governor Phil Scott"
    loop {
        let n = leading_title_len(&tokens);
        if n == 0 {
            break;
        }
        tokens.drain(..n);
    }

    tokens.join(" ")
}

fn normalize_organization(form: &str) -> String {
    let mut rest = form.trim();
    while rest.len() > 4 && rest.as_bytes()[..4].eq_ignore_ascii_case(b"the ") {
        rest = rest[4..].trim_start();
    }
    rest.to_string()
}

/// Lowercased token with trailing punctuation removed ("Sen." -> "sen")
fn clean(token: &str) -> String {
    token.trim_end_matches(['.', ',']).to_lowercase()
}

/// Length in tokens of a leading title: 2 for "Vice President",
/// 1 for a single title word, 0 otherwise.
fn leading_title_len(tokens: &[&str]) -> usize {
    if tokens.len() >= 2 && clean(tokens[0]) == "vice" && clean(tokens[1]) == "president" {
        return 2;
    }
    if !tokens.is_empty() && TITLES.contains(&clean(tokens[0]).as_str()) {
        return 1;
    }
    0
}

// =============================================================================
// Fact merging
// =============================================================================

/// Working entry while merging: the surviving fact plus the confidence of
/// the member that supplied its Wikidata fields.
struct MergeEntry {
    key: (String, EntityType),
    fact: Fact,
    wikidata_confidence: Option<f64>,
}

/// Merge duplicate facts within one article
///
/// Facts are grouped by `(normalize(form, type), type)` and collapsed
/// across groups with the substring equivalence rule. Merge policy:
/// shortest surviving form wins as the canonical surface, confidence is
/// the maximum across members, sources are unioned, Wikidata fields come
/// from the highest-confidence member that has any, and the event
/// description follows the maximum confidence. Key renames are collected
/// during the pass and applied afterwards, never mid-iteration.
pub fn merge_facts(facts: Vec<Fact>) -> Vec<Fact> {
    let mut entries: Vec<MergeEntry> = Vec::new();
    let mut renames: Vec<(usize, (String, EntityType))> = Vec::new();

    for fact in facts {
        let normalized = normalize(&fact.form, fact.entity_type);
        let key = (normalized.clone(), fact.entity_type);

        let matched = entries.iter().position(|entry| {
            entry.key.1 == fact.entity_type
                && equivalent(&entry.key.0, &normalized, entry.key.1, fact.entity_type)
        });

        match matched {
            Some(idx) => {
                // Prefer the shorter (more general) canonical form, but
                // defer the rebind until after the pass.
                if normalized.chars().count() < entries[idx].key.0.chars().count() {
                    renames.push((idx, key));
                }
                merge_into(&mut entries[idx], fact);
            }
            None => {
                let mut fact = fact;
                let wikidata_confidence = fact.wikidata_id.as_ref().map(|_| fact.confidence);
                fact.form = normalized;
                entries.push(MergeEntry {
                    key,
                    fact,
                    wikidata_confidence,
                });
            }
        }
    }

    // Apply deferred renames, keeping the shortest surviving form
    for (idx, new_key) in renames {
        if new_key.0.chars().count() < entries[idx].key.0.chars().count() {
            entries[idx].fact.form = new_key.0.clone();
            entries[idx].key = new_key;
        }
    }

    entries.into_iter().map(|entry| entry.fact).collect()
}

fn merge_into(entry: &mut MergeEntry, incoming: Fact) {
    let existing = &mut entry.fact;

    // Confidence takes the maximum; the event description rides along
    if incoming.confidence > existing.confidence {
        existing.confidence = incoming.confidence;
        existing.event_description = incoming.event_description.clone();
    }

    // Sources: set union, insertion order preserved
    for source in &incoming.sources {
        if !existing.sources.contains(source) {
            existing.sources.push(source.clone());
        }
    }

    // Wikidata fields from the highest-confidence member that has any
    if incoming.wikidata_id.is_some() {
        let better = match entry.wikidata_confidence {
            Some(current) => incoming.confidence > current,
            None => true,
        };
        if better {
            existing.wikidata_id = incoming.wikidata_id;
            existing.wikidata_description = incoming.wikidata_description;
            entry.wikidata_confidence = Some(incoming.confidence);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
