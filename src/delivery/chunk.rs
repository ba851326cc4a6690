/// Platform cap on a single message body, in characters.
pub const MESSAGE_MAX_CHARS: usize = 2_000;

/// Splits `text` into ordered chunks of at most `limit` characters.
///
/// Each cut prefers the last newline inside the window, then the last space,
/// as long as it leaves at least half a window in the chunk; otherwise the
/// text is cut hard at `limit`. The newline or space at a cut is dropped.
/// Chunks that would be blank are skipped.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let min_head = (limit / 2).max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > limit {
        let window = &rest[..=limit];
        let cut = last_break(window, '\n', min_head).or_else(|| last_break(window, ' ', min_head));
        let (head_len, skip) = match cut {
            Some(idx) => (idx, 1),
            None => (limit, 0),
        };
        push_chunk(&mut chunks, &rest[..head_len]);
        rest.drain(..head_len + skip);
    }
    push_chunk(&mut chunks, &rest);
    chunks
}

/// Index of the last `delim` in `window` with at least `min_head` chars
/// before it.
fn last_break(window: &[char], delim: char, min_head: usize) -> Option<usize> {
    window
        .iter()
        .rposition(|ch| *ch == delim)
        .filter(|idx| *idx >= min_head)
}

fn push_chunk(chunks: &mut Vec<String>, chars: &[char]) {
    if chars.iter().all(|ch| ch.is_whitespace()) {
        return;
    }
    chunks.push(chars.iter().collect());
}
