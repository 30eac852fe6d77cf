//! Paragraph-aware document chunking.

use std::path::Path;

use crate::retrieval::{Chunk, ChunkMetadata};

/// Page separator recognised in extracted text.
const PAGE_BREAK: char = '\u{c}';

/// Split `text` into chunks of at most roughly `size` characters.
///
/// Paragraphs (blank-line separated) are packed greedily; consecutive chunks
/// share up to `overlap` trailing characters, cut at a word boundary. A
/// paragraph longer than `size` is split into fixed windows. Form feeds mark
/// page boundaries: chunks never span pages and carry a 1-based page number.
/// Chunk ids are `"{source-stem}#{index}"`.
pub fn chunk_document(source: &str, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let stem = source_stem(source);
    let document_type = document_type_for(source);

    let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    let paged = pages.len() > 1;

    let mut chunks = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        for piece in split_page(page, size, overlap) {
            let mut metadata = ChunkMetadata::default()
                .with_source(source)
                .with_document_type(document_type.clone());
            if paged {
                metadata = metadata.with_page(page_idx as u32 + 1);
            }
            let id = format!("{stem}#{}", chunks.len());
            chunks.push(Chunk::new(id, piece).with_metadata(metadata));
        }
    }
    chunks
}

/// Document type derived from the file extension.
pub fn document_type_for(source: &str) -> String {
    let ext = Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "markdown" => "markdown".to_string(),
        "txt" | "" => "text".to_string(),
        "htm" | "html" => "html".to_string(),
        other => other.to_string(),
    }
}

fn source_stem(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

fn split_page(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();
        if para_len > size {
            if !current.trim().is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current.clear();
            out.extend(split_fixed(para, size, overlap));
            continue;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 2 + para_len > size {
            let tail = word_tail(&current, overlap);
            out.push(std::mem::take(&mut current));
            if !tail.is_empty() && tail.chars().count() + 2 + para_len <= size {
                current = tail;
            }
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }

    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn split_fixed(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

/// Last `overlap` characters of `text`, starting at a word boundary.
fn word_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= overlap {
        return String::new();
    }
    let tail: String = chars[chars.len() - overlap..].iter().collect();
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start().to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunks = chunk_document("notes/ideas.md", "First paragraph.\n\nSecond one.", 800, 80);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "ideas#0");
        assert_eq!(chunks[0].metadata.document_type.as_deref(), Some("markdown"));
        assert_eq!(chunks[0].metadata.source_path.as_deref(), Some("notes/ideas.md"));
        assert_eq!(chunks[0].metadata.page, None);
        assert!(chunks[0].text.contains("Second one."));
    }

    #[test]
    fn test_paragraphs_pack_up_to_size() {
        let para = "word ".repeat(20);
        let text = vec![para.trim(); 5].join("\n\n");
        let chunks = chunk_document("draft.txt", &text, 250, 0);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.text.chars().count() <= 250, "chunk too long: {}", c.text.len());
        }
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids[0], "draft#0");
        assert_eq!(ids[1], "draft#1");
    }

    #[test]
    fn test_long_paragraph_is_windowed() {
        let text = "x".repeat(2500);
        let chunks = chunk_document("blob.txt", &text, 1000, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 1000);
    }

    #[test]
    fn test_form_feeds_become_pages() {
        let text = "Page one text.\u{c}Page two text.\u{c}Page three.";
        let chunks = chunk_document("paper.pdf", text, 800, 80);
        let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.metadata.page).collect();
        assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(chunks[2].id, "paper#2");
        assert_eq!(chunks[0].metadata.document_type.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_overlap_carries_trailing_words() {
        let a = "alpha beta gamma delta epsilon";
        let b = "zeta eta theta iota kappa";
        let text = format!("{a}\n\n{b}");
        let chunks = chunk_document("greek.txt", &text, 40, 12);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("epsilon"));
        assert!(chunks[1].text.ends_with("kappa"));
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_document("empty.txt", "", 800, 80).is_empty());
        assert!(chunk_document("empty.txt", "\n\n   \n\n", 800, 80).is_empty());
    }

    #[test]
    fn test_document_type_for() {
        assert_eq!(document_type_for("a/b/c.PDF"), "pdf");
        assert_eq!(document_type_for("README"), "text");
        assert_eq!(document_type_for("page.html"), "html");
    }
}
