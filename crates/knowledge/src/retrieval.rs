//! Chunking and formatting of knowledge base content.

use crate::types::KnowledgeChunk;

const SEPARATOR_WIDTH: usize = 80;

/// Split `text` into windows of at most `size` characters, consecutive
/// windows sharing `overlap` characters. Cuts prefer whitespace in the
/// second half of a window.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            let soft_floor = start + size / 2;
            if let Some(cut) = (soft_floor..end)
                .rev()
                .find(|&i| i > start && chars[i].is_whitespace())
            {
                end = cut;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Render retrieved chunks as the knowledge lookup observation.
pub fn format_documents(chunks: &[KnowledgeChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant documents found in knowledge base.".into();
    }

    let separator = "=".repeat(SEPARATOR_WIDTH);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Document {}]\nMetadata: {}\nContent:\n{}\n{}\n",
                i + 1,
                chunk.metadata.describe(),
                chunk.content,
                separator
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMetadata;
    use crew_common::Specialty;
    use std::path::Path;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_text("  warfarina  ", 100, 10), vec!["warfarina"]);
        assert!(chunk_text("", 100, 10).is_empty());
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = "uno dos tres cuatro cinco seis siete ocho nueve diez once doce";
        let chunks = chunk_text(text, 20, 5);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert!(chunks.first().unwrap().starts_with("uno"));
        assert!(chunks.last().unwrap().ends_with("doce"));
    }

    #[test]
    fn chunking_terminates_with_degenerate_settings() {
        let chunks = chunk_text("a b c d e", 1, 5);
        assert_eq!(chunks, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn chunking_handles_multibyte_text() {
        let text = "insuficiencia cardíaca con fracción de eyección reducida ".repeat(10);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn format_lists_documents_with_metadata() {
        let chunk = KnowledgeChunk {
            id: "c1".into(),
            content: "CHA2DS2-VASc >= 2 en varones: anticoagular.".into(),
            metadata: DocumentMetadata::from_file_name(
                Specialty::Cardiology,
                Path::new("2020_ESC_af.md"),
            ),
        };
        let text = format_documents(&[chunk]);
        assert!(text.starts_with("[Document 1]\nMetadata: specialty: cardiology"));
        assert!(text.contains("Content:\nCHA2DS2-VASc"));
        assert!(text.contains(&"=".repeat(80)));
    }

    #[test]
    fn format_empty_result() {
        assert_eq!(
            format_documents(&[]),
            "No relevant documents found in knowledge base."
        );
    }
}
