//! Content-addressed keys for synthesized sentence audio
//!
//! A key is the lowercase hex SHA-256 of the identifying fields. Each field is
//! fed with a little-endian length prefix so that no two distinct field tuples
//! produce the same byte stream. The speech rate is hashed through its IEEE-754
//! bit pattern: any change to the rate yields a different key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which fields participate in the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScope {
    /// book, chapter, sentence, text, voice and speech rate
    #[default]
    Sentence,
    /// text, voice and speech rate only
    ///
    /// Identical sentences shared between books resolve to one entry. Deleting
    /// one book's audio may then remove audio another book also uses.
    Content,
}

/// Fields identifying one synthesized utterance
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyFields<'a> {
    pub book_id: &'a str,
    pub chapter_id: &'a str,
    pub sentence_id: &'a str,
    pub text: &'a str,
    pub voice: &'a str,
    pub speech_rate: f32,
}

/// Hex SHA-256 cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(fields: &CacheKeyFields<'_>, scope: KeyScope) -> Self {
        let mut hasher = Sha256::new();
        match scope {
            KeyScope::Sentence => {
                hasher.update([0u8]);
                feed(&mut hasher, fields.book_id.as_bytes());
                feed(&mut hasher, fields.chapter_id.as_bytes());
                feed(&mut hasher, fields.sentence_id.as_bytes());
            }
            KeyScope::Content => hasher.update([1u8]),
        }
        feed(&mut hasher, fields.text.as_bytes());
        feed(&mut hasher, fields.voice.as_bytes());
        feed(&mut hasher, &fields.speech_rate.to_bits().to_le_bytes());

        let digest = hasher.finalize();
        CacheKey(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Wrap a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        CacheKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn feed(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> CacheKeyFields<'static> {
        CacheKeyFields {
            book_id: "book-1",
            chapter_id: "ch-1",
            sentence_id: "s-1",
            text: "It was a bright cold day in April.",
            voice: "alto",
            speech_rate: 1.0,
        }
    }

    #[test]
    fn test_key_is_deterministic_hex() {
        let a = CacheKey::derive(&fields(), KeyScope::Sentence);
        let b = CacheKey::derive(&fields(), KeyScope::Sentence);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_every_field_changes_the_key() {
        let base = CacheKey::derive(&fields(), KeyScope::Sentence);
        let variants = [
            CacheKeyFields { book_id: "book-2", ..fields() },
            CacheKeyFields { chapter_id: "ch-2", ..fields() },
            CacheKeyFields { sentence_id: "s-2", ..fields() },
            CacheKeyFields { text: "It was a bright cold day in May.", ..fields() },
            CacheKeyFields { voice: "tenor", ..fields() },
            CacheKeyFields { speech_rate: 1.0001, ..fields() },
        ];
        for variant in variants {
            assert_ne!(CacheKey::derive(&variant, KeyScope::Sentence), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let a = CacheKeyFields { book_id: "ab", chapter_id: "c", ..fields() };
        let b = CacheKeyFields { book_id: "a", chapter_id: "bc", ..fields() };
        assert_ne!(
            CacheKey::derive(&a, KeyScope::Sentence),
            CacheKey::derive(&b, KeyScope::Sentence)
        );
    }

    #[test]
    fn test_content_scope_ignores_location() {
        let moved = CacheKeyFields { book_id: "other", sentence_id: "s-99", ..fields() };
        assert_eq!(
            CacheKey::derive(&fields(), KeyScope::Content),
            CacheKey::derive(&moved, KeyScope::Content)
        );
        assert_ne!(
            CacheKey::derive(&fields(), KeyScope::Content),
            CacheKey::derive(&fields(), KeyScope::Sentence)
        );
    }
}
