//! Splits narration text into short on-screen chunks and times them against the spoken audio.
//!
//! Timing uses a character-weight model: pauses (whitespace, commas) count half, sentence
//! terminals count double, everything else counts one. A chunk's share of the segment is its
//! weight over the total weight.

/// One timed subtitle line.
#[derive(Clone, Debug, PartialEq)]
pub struct SubtitleChunk {
    pub text: String,
    pub weight: f64,
    pub duration_sec: f64,
}

const SENTENCE_ENDERS: &[char] = &['.', '?', '!', '。', '？', '！', '…'];

fn is_sentence_ender(c: char) -> bool {
    SENTENCE_ENDERS.contains(&c)
}

/// Per-character speech weight.
pub fn char_weight(c: char) -> f64 {
    match c {
        c if c.is_whitespace() => 0.5,
        ',' | '、' | '，' => 0.5,
        '.' | '?' | '!' | '。' | '？' | '！' => 2.0,
        _ => 1.0,
    }
}

pub fn chunk_weight(text: &str) -> f64 {
    text.chars().map(char_weight).sum()
}

/// Split into sentences, keeping terminal punctuation attached.
///
/// A run of consecutive terminals (`?!`, `...`) stays with its sentence, and a period between two
/// digits (`3.5`) is not a boundary.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut cur = String::new();
    for (i, &c) in chars.iter().enumerate() {
        cur.push(c);
        if !is_sentence_ender(c) {
            continue;
        }
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let decimal_point =
            c == '.' && prev.is_some_and(|p| p.is_ascii_digit()) && next.is_some_and(|n| n.is_ascii_digit());
        if decimal_point || next.is_some_and(is_sentence_ender) {
            continue;
        }
        let s = cur.trim();
        if !s.is_empty() {
            out.push(s.to_owned());
        }
        cur.clear();
    }
    let s = cur.trim();
    if !s.is_empty() {
        out.push(s.to_owned());
    }
    out
}

/// Split `text` into display chunks of at most `max_chars` Unicode scalars.
///
/// Words are never split; a word longer than the budget becomes its own chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    for sentence in split_sentences(text) {
        let mut cur = String::new();
        let mut cur_len = 0usize;
        for word in sentence.split_whitespace() {
            let word_len = word.chars().count();
            if cur_len > 0 && cur_len + 1 + word_len > max_chars {
                chunks.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            if cur_len > 0 {
                cur.push(' ');
                cur_len += 1;
            }
            cur.push_str(word);
            cur_len += word_len;
        }
        if !cur.is_empty() {
            chunks.push(cur);
        }
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Distribute `total_sec` over `chunks` proportionally to their weights.
///
/// Zero total weight falls back to an equal split. The last chunk takes whatever floating point
/// residue is left so the durations sum to `total_sec` exactly.
pub fn allocate_durations(chunks: &[String], total_sec: f64) -> Vec<SubtitleChunk> {
    if chunks.is_empty() {
        return Vec::new();
    }
    let total_sec = total_sec.max(0.0);
    let weights: Vec<f64> = chunks.iter().map(|c| chunk_weight(c)).collect();
    let sum: f64 = weights.iter().sum();
    let n = chunks.len();

    let mut out = Vec::with_capacity(n);
    let mut used = 0.0f64;
    for (i, (text, weight)) in chunks.iter().zip(weights).enumerate() {
        let duration_sec = if i + 1 == n {
            (total_sec - used).max(0.0)
        } else if sum > 0.0 {
            weight / sum * total_sec
        } else {
            total_sec / n as f64
        };
        used += duration_sec;
        out.push(SubtitleChunk {
            text: text.clone(),
            weight,
            duration_sec,
        });
    }
    out
}

/// Chunk and time one segment's narration.
pub fn build_subtitle_track(text: &str, max_chars: usize, total_sec: f64) -> Vec<SubtitleChunk> {
    allocate_durations(&chunk_text(text, max_chars), total_sec)
}
