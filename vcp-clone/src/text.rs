//! Text helpers: whitespace normalization, TTS chunking, WER tokenization

/// Trim and collapse internal whitespace runs to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase words for WER scoring
///
/// Every character that is neither alphanumeric nor an apostrophe acts as a
/// separator.
pub fn normalize_words(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

/// Split normalized text into sentences (terminator kept with its sentence)
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if is_sentence_end(c) {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..next_idx].trim();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                    start = next_idx;
                }
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Split `piece` on character boundaries into parts of at most `max_chars`
fn split_chars(piece: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = piece.chars().collect();
    chars
        .chunks(max_chars)
        .map(|part| part.iter().collect())
        .collect()
}

/// Greedy packer that joins pieces with a single space
struct Packer {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Append a piece known to fit within `max_chars` on its own
    fn push(&mut self, piece: &str) {
        let len = piece.chars().count();
        let needed = if self.current.is_empty() {
            len
        } else {
            self.current_len + 1 + len
        };

        if needed > self.max_chars {
            self.flush();
            self.current.push_str(piece);
            self.current_len = len;
        } else {
            if !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(piece);
            self.current_len = needed;
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Split text into segments of at most `max_chars` characters
///
/// Sentences are packed greedily. An oversized sentence falls back to word
/// boundaries, and an oversized word to character boundaries. Joining the
/// chunks with single spaces yields the whitespace-normalized input.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = normalize_whitespace(text);
    let mut packer = Packer::new(max_chars);

    for sentence in sentences(&normalized) {
        if sentence.chars().count() <= max_chars {
            packer.push(sentence);
            continue;
        }
        for word in sentence.split(' ') {
            if word.chars().count() <= max_chars {
                packer.push(word);
            } else {
                for part in split_chars(word, max_chars) {
                    packer.push(&part);
                }
            }
        }
    }

    packer.finish()
}
