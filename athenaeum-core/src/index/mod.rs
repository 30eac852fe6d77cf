//! Reference in-memory collaborators.
//!
//! Small, dependency-light implementations of the retrieval collaborator
//! traits: a hashed bag-of-words embedder, a cosine vector index, a RAM-backed
//! Tantivy BM25 index, a lexical pairwise scorer, a paragraph-aware chunker,
//! and a builder producing isolated index pairs. They back the CLI, the tests
//! and the temporary draft index used by cross-examination.

pub mod builder;
pub mod chunker;
pub mod embedder;
pub mod keyword;
pub mod scorer;
pub mod vector;

pub use builder::{BuiltIndex, InMemoryIndexBuilder, IndexBuilder};
pub use chunker::{chunk_document, document_type_for};
pub use embedder::{HashEmbedder, cosine_similarity};
pub use keyword::TantivyKeywordIndex;
pub use scorer::LexicalOverlapScorer;
pub use vector::InMemoryVectorIndex;

/// Lowercased alphanumeric terms of `text`, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Gradient-Descent, explained (2nd ed.)"),
            vec!["gradient", "descent", "explained", "2nd", "ed"]
        );
        assert!(tokenize("  ... ").is_empty());
    }
}
