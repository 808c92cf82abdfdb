//! Ordered sentences of one book

use crate::cache::client::CacheRequest;
use crate::synthesis::SynthesisRequest;
use serde::{Deserialize, Serialize};

/// One synthesizable sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub chapter_id: String,
    pub chapter_index: usize,
    pub text: String,
}

/// Sentences of a book in reading order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub book_id: String,
    pub sentences: Vec<Sentence>,
}

impl Playlist {
    pub fn new(book_id: impl Into<String>, sentences: Vec<Sentence>) -> Self {
        Self {
            book_id: book_id.into(),
            sentences,
        }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    pub fn index_of(&self, sentence_id: &str) -> Option<usize> {
        self.sentences.iter().position(|s| s.id == sentence_id)
    }

    pub fn next_index(&self, index: usize) -> Option<usize> {
        let next = index + 1;
        (next < self.sentences.len()).then_some(next)
    }

    pub fn previous_index(&self, index: usize) -> Option<usize> {
        index.checked_sub(1).filter(|i| *i < self.sentences.len())
    }

    /// Ids in reading order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sentences.iter().map(|s| s.id.as_str())
    }

    /// Reject duplicate or empty sentence ids
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for sentence in &self.sentences {
            if sentence.id.is_empty() {
                return Err("sentence id must not be empty".to_string());
            }
            if !seen.insert(sentence.id.as_str()) {
                return Err(format!("duplicate sentence id '{}'", sentence.id));
            }
        }
        Ok(())
    }
}

/// Voice and speech rate applied to synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub voice: String,
    pub speech_rate: f32,
}

impl SynthesisParams {
    pub fn cache_request(&self, book_id: &str, sentence: &Sentence) -> CacheRequest {
        CacheRequest {
            book_id: book_id.to_string(),
            chapter_id: sentence.chapter_id.clone(),
            sentence_id: sentence.id.clone(),
            text: sentence.text.clone(),
            voice: self.voice.clone(),
            speech_rate: self.speech_rate,
        }
    }

    pub fn synthesis_request(&self, sentence: &Sentence) -> SynthesisRequest {
        SynthesisRequest {
            text: sentence.text.clone(),
            voice: self.voice.clone(),
            speech_rate: self.speech_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(n: usize) -> Playlist {
        let sentences = (0..n)
            .map(|i| Sentence {
                id: format!("s{}", i),
                chapter_id: "c0".to_string(),
                chapter_index: 0,
                text: format!("Sentence {}.", i),
            })
            .collect();
        Playlist::new("book", sentences)
    }

    #[test]
    fn test_navigation_bounds() {
        let p = playlist(3);
        assert_eq!(p.next_index(0), Some(1));
        assert_eq!(p.next_index(2), None);
        assert_eq!(p.previous_index(0), None);
        assert_eq!(p.previous_index(2), Some(1));
        assert_eq!(p.index_of("s2"), Some(2));
        assert_eq!(p.index_of("missing"), None);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut p = playlist(2);
        assert!(p.validate().is_ok());
        p.sentences[1].id = "s0".to_string();
        assert!(p.validate().is_err());
    }
}
