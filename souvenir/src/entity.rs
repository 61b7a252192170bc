//! Entity extraction (§4.10, §4.11): neither module defines the heuristic,
//! so this is written fresh as a small trait with a swappable default
//! implementation, following the same shape as [`crate::embedder::Embedder`].

use std::collections::BTreeSet;

/// Pulls a set of named entities out of free text.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Capitalized-phrase heuristic: runs of consecutive capitalized words (that
/// aren't the first word of a sentence) are taken as entity mentions, e.g.
/// "New York City" or "Envoy". Good enough to link recurring proper nouns
/// across episodes without an NLP dependency.
pub struct HeuristicEntityExtractor;

impl HeuristicEntityExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_capitalized_word(word: &str) -> bool {
        word.chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && word.chars().any(|c| c.is_alphabetic())
    }

    fn strip_punctuation(word: &str) -> &str {
        word.trim_matches(|c: char| !c.is_alphanumeric())
    }
}

impl Default for HeuristicEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for HeuristicEntityExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let mut entities = BTreeSet::new();
        for sentence in text.split(['.', '!', '?', '\n']) {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            let mut run: Vec<&str> = Vec::new();
            for (idx, raw) in words.iter().enumerate() {
                let word = Self::strip_punctuation(raw);
                let is_sentence_start = idx == 0;
                if !word.is_empty() && Self::is_capitalized_word(word) && !is_sentence_start {
                    run.push(word);
                } else {
                    if run.len() >= 1 {
                        entities.insert(run.join(" "));
                    }
                    run.clear();
                }
            }
            if run.len() >= 1 {
                entities.insert(run.join(" "));
            }
        }
        entities.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multi_word_proper_noun() {
        let extractor = HeuristicEntityExtractor::new();
        let entities = extractor.extract("We should deploy to New York City next.");
        assert!(entities.contains(&"New York City".to_string()));
    }

    #[test]
    fn ignores_sentence_initial_capitalization() {
        let extractor = HeuristicEntityExtractor::new();
        let entities = extractor.extract("Rabbits are nice.");
        assert!(!entities.contains(&"Rabbits".to_string()));
    }

    #[test]
    fn extracts_single_capitalized_token() {
        let extractor = HeuristicEntityExtractor::new();
        let entities = extractor.extract("We use Envoy for this.");
        assert!(entities.contains(&"Envoy".to_string()));
    }
}
