//! Retrieval data model: chunks, candidates and fused results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RetrievalError;
use crate::types::Citation;

/// Source metadata attached to a chunk by the ingestion collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Free-form fields that have no dedicated slot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Look up a field by name, covering both the typed slots and `extra`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "source_path" | "source" | "path" => self.source_path.clone(),
            "page" => self.page.map(|p| p.to_string()),
            "document_type" | "type" => self.document_type.clone(),
            "language" | "lang" => self.language.clone(),
            "created_at" => self.created_at.map(|t| t.to_rfc3339()),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Immutable unit of indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Equality predicate over one metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive match; a missing field never matches.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata
            .field(&self.field)
            .is_some_and(|v| v.eq_ignore_ascii_case(&self.value))
    }
}

/// One row returned by a vector or keyword index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

/// Where a candidate's current score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Dense,
    Sparse,
    Reranked,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Dense => write!(f, "dense"),
            Origin::Sparse => write!(f, "sparse"),
            Origin::Reranked => write!(f, "reranked"),
        }
    }
}

/// A retrieval hit scoped to one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk: Chunk,
    pub score: f64,
    pub origin: Origin,
}

impl Candidate {
    pub fn new(chunk: Chunk, score: f64, origin: Origin) -> Self {
        Self {
            chunk,
            score,
            origin,
        }
    }

    pub fn from_hit(hit: IndexHit, origin: Origin) -> Self {
        Self {
            chunk: Chunk {
                id: hit.chunk_id,
                text: hit.text,
                metadata: hit.metadata,
            },
            score: hit.score,
            origin,
        }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn citation(&self) -> Citation {
        Citation {
            chunk_id: self.chunk.id.clone(),
            source_path: self.chunk.metadata.source_path.clone(),
            page: self.chunk.metadata.page,
            score: self.score,
            corpus: None,
        }
    }
}

impl From<&Candidate> for Citation {
    fn from(candidate: &Candidate) -> Self {
        candidate.citation()
    }
}

/// Output of the fusion engine.
///
/// Candidates carry their fused score and are ordered by it, highest first,
/// with no repeated chunk id. `failures` lists retrievers whose contribution
/// is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub candidates: Vec<Candidate>,
    #[serde(skip)]
    pub failures: Vec<RetrievalError>,
}

impl FusedResult {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.id()).collect()
    }
}
