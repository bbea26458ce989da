use std::collections::VecDeque;

/// Separators tried in order, from paragraph breaks down to single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter with overlap between adjacent chunks.
///
/// Lengths are counted in `char`s. A chunk exceeds `chunk_size` only when a
/// single piece cannot be split further.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on `separator`, attaching it to the start of the following piece.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Splits `text` into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &DEFAULT_SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let (separator, rest) = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .map(|i| (separators[i], &separators[i + 1..]))
            .unwrap_or(("", &[][..]));

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if rest.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, rest));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily packs small pieces into chunks, carrying up to
    /// `chunk_overlap` trailing characters into the next chunk.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(500, 50);
        let chunks = splitter.split("Check tire pressure.\n\nRotate tires every 5,000 miles.");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Check tire pressure."));
    }

    #[test]
    fn test_empty_and_whitespace() {
        let splitter = TextSplitter::new(100, 10);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n  \n ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let para = "Loosen the drain plug and let the oil drain completely. ".repeat(20);
        let text = vec![para; 6].join("\n\n");
        let splitter = TextSplitter::new(300, 60);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 6);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 300, "chunk too long: {}", char_len(chunk));
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text: String = (0..200).map(|i| format!("w{i:03} ")).collect();
        let splitter = TextSplitter::new(50, 20);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "{:?} does not continue {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_no_overlap_when_zero() {
        let text: String = (0..100).map(|i| format!("w{i:03} ")).collect();
        let splitter = TextSplitter::new(40, 0);
        let chunks = splitter.split(&text);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(!pair[0].contains(first_word));
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let splitter = TextSplitter::new(100, 0);
        let chunks = splitter.split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[2]), 50);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "ブレーキパッドを交換します。".repeat(40);
        let splitter = TextSplitter::new(120, 20);
        let chunks = splitter.split(&text);
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 120);
        }
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a b c", " "),
            vec!["a".to_string(), " b".to_string(), " c".to_string()]
        );
    }
}
