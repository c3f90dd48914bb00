//! Document ingestion: text normalisation and chunking.

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

/// Collapses runs of whitespace and trims. Paragraph breaks become a single newline.
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `text` into chunks of at most `size` characters where consecutive
/// chunks share about `overlap` characters. Cuts prefer whitespace.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < size, "overlap must be smaller than the chunk size");

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + size).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            // Back off to the last whitespace in the second half of the window.
            if let Some(ws) = (start + size / 2..hard_end).rev().find(|&i| chars[i].is_whitespace()) {
                end = ws;
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

        let mut next = end.saturating_sub(overlap).max(start + 1);
        // Start the next chunk on a word boundary.
        while next < end && !chars[next - 1].is_whitespace() {
            next += 1;
        }
        start = next;
    }

    chunks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub normalized: String,
    pub chunks: Vec<String>,
}

pub fn ingest(raw: &str) -> Result<IngestOutcome, String> {
    let normalized = normalize_text(raw);
    if normalized.is_empty() {
        return Err("Document has no text content.".to_string());
    }
    let chunks = chunk_text(&normalized, CHUNK_SIZE, CHUNK_OVERLAP);
    Ok(IngestOutcome { normalized, chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_paragraphs() {
        let raw = "  Hello   world\t again \n\n\n  second\n para  ";
        assert_eq!(normalize_text(raw), "Hello world again\nsecond para");
    }

    #[test]
    fn windows_line_endings_keep_paragraphs() {
        let raw = "Opening hours\r\nweekdays only\r\n\r\nReturns within 30 days\r\n";
        assert_eq!(normalize_text(raw), "Opening hours weekdays only\nReturns within 30 days");
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("just a little text", 1000, 200), vec!["just a little text"]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let words: Vec<String> = (0..400).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 300, 60);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 300);
            // Never splits inside a word.
            for w in chunk.split(' ') {
                assert!(w.starts_with("word"), "{w}");
            }
        }
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word), "consecutive chunks should overlap");
        }
        assert!(chunks.last().unwrap().ends_with("word399"));
    }

    #[test]
    fn text_without_spaces_still_terminates() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks[0].len(), 1000);
        assert!(chunks.iter().all(|c| c.len() <= 1000));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(ingest("   \n\n  ").is_err());
        let outcome = ingest("Refunds are processed within 5 days.").unwrap();
        assert_eq!(outcome.chunks.len(), 1);
    }
}
