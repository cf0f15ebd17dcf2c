//! Size-bounding helpers for LLM-facing text.

/// Notice inserted where content was removed by [`truncate_smart`].
pub const TRUNCATION_NOTICE: &str = "\n\n[...Content truncated...]\n\n";

const SIMPLE_NOTICE: &str = "\n\n[Note: Content was truncated due to length limitations.]";

/// Truncate `content` to at most `max_size` bytes, keeping the beginning and
/// appending a note.
pub fn truncate_content(content: &str, max_size: usize) -> String {
    if content.len() <= max_size {
        return content.to_string();
    }
    let keep = max_size.saturating_sub(SIMPLE_NOTICE.len());
    let mut out = String::with_capacity(max_size);
    out.push_str(slice_at_char_boundary(content, keep));
    out.push_str(SIMPLE_NOTICE);
    out
}

/// Truncate `content` to at most `max_size` bytes keeping the head and tail.
///
/// Keeps 60% of the remaining budget from the beginning and 40% from the
/// end, trimming each side to a sentence boundary: the head is cut at its
/// last `.`, the tail starts after its first `.`.
pub fn truncate_smart(content: &str, max_size: usize) -> String {
    if content.len() <= max_size {
        return content.to_string();
    }

    let budget = max_size.saturating_sub(TRUNCATION_NOTICE.len());
    let head_size = (budget as f64 * 0.6) as usize;
    let tail_size = (budget as f64 * 0.4) as usize;

    let mut head = slice_at_char_boundary(content, head_size);
    if let Some(idx) = head.rfind('.') {
        if idx > 0 {
            head = &head[..=idx];
        }
    }

    let tail_start = content.len() - tail_size;
    let mut tail = slice_from_char_boundary(content, tail_start);
    if let Some(idx) = tail.find('.') {
        if idx > 0 {
            tail = &tail[idx + 1..];
        }
    }

    let mut out = String::with_capacity(head.len() + TRUNCATION_NOTICE.len() + tail.len());
    out.push_str(head);
    out.push_str(TRUNCATION_NOTICE);
    out.push_str(tail);
    out
}

fn slice_at_char_boundary(s: &str, mut end: usize) -> &str {
    if end >= s.len() {
        return s;
    }
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn slice_from_char_boundary(s: &str, mut start: usize) -> &str {
    if start >= s.len() {
        return "";
    }
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> String {
        (0..n).map(|i| format!("Sentence number {i} fills some space.")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_content_passes_through() {
        let s = "short text.";
        assert_eq!(truncate_smart(s, 100), s);
        assert_eq!(truncate_content(s, 100), s);
    }

    #[test]
    fn smart_truncation_bounds_and_notice() {
        let input = sentences(8000);
        assert!(input.len() > 250_000);
        let out = truncate_smart(&input, 100_000);
        assert!(out.len() <= 100_000, "length {} exceeds limit", out.len());
        assert!(out.len() >= 99_900, "length {} lost too much", out.len());
        assert!(out.contains("[...Content truncated...]"));
        assert_eq!(&out[..1000], &input[..1000]);
        // The tail comes from the last 40% of the input.
        let tail = &out[out.len() - 200..];
        assert!(input[input.len() * 6 / 10..].contains(tail));
    }

    #[test]
    fn smart_truncation_is_idempotent() {
        let input = sentences(8000);
        let once = truncate_smart(&input, 100_000);
        let twice = truncate_smart(&once, 100_000);
        assert_eq!(once, twice);
    }

    #[test]
    fn smart_truncation_is_deterministic() {
        let input = sentences(5000);
        assert_eq!(truncate_smart(&input, 50_000), truncate_smart(&input, 50_000));
    }

    #[test]
    fn head_ends_at_sentence_boundary() {
        let input = sentences(4000);
        let out = truncate_smart(&input, 60_000);
        let head = out.split(TRUNCATION_NOTICE).next().unwrap();
        assert!(head.ends_with('.'));
    }

    #[test]
    fn simple_truncation_keeps_head() {
        let input = sentences(1000);
        let out = truncate_content(&input, 5_000);
        assert!(out.len() <= 5_000);
        assert!(out.starts_with("Sentence number 0"));
        assert!(out.ends_with("[Note: Content was truncated due to length limitations.]"));
    }

    #[test]
    fn multibyte_input_never_splits_chars() {
        let input = "héllo wörld. ".repeat(10_000);
        let out = truncate_smart(&input, 50_000);
        assert!(out.len() <= 50_000);
        // Would have panicked on a bad boundary; also confirm it is valid by
        // iterating chars.
        let _ = out.chars().count();
    }
}
