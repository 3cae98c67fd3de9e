//! Boundary-aware text segmentation
//!
//! Splits article bodies into bounded segments so each one is summarizable
//! as a coherent unit. Preferred split points, in order: paragraph break,
//! sentence break, plain space, hard cut. Paragraph and sentence breaks are
//! only accepted past the midpoint of the window, which prevents a break
//! sitting early in the window from producing a near-empty leading segment.

/// Split `text` into ordered, trimmed, non-empty segments of at most
/// `max_chars` bytes each.
///
/// The cursor always advances, so the function terminates even on input with
/// no whitespace at all. A segment may exceed `max_chars` only when it is the
/// final remainder of the text.
pub fn segment(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();

    if text.len() <= max_chars {
        push_trimmed(&mut segments, text);
        return segments;
    }

    let mut pos = 0;
    while pos < text.len() {
        if text.len() - pos <= max_chars {
            push_trimmed(&mut segments, &text[pos..]);
            break;
        }

        let mut end = floor_char_boundary(text, pos + max_chars);
        if end <= pos {
            // A single multi-byte character wider than the budget; take it
            // whole rather than stalling.
            end = next_char_boundary(text, pos + 1);
        }

        let window = &text[pos..end];
        let midpoint = max_chars / 2;

        let split = if let Some(p) = window.rfind("\n\n").filter(|&p| p > midpoint) {
            pos + p + 2
        } else if let Some(p) = window.rfind(". ").filter(|&p| p > midpoint) {
            pos + p + 2
        } else if let Some(p) = window.rfind(' ').filter(|&p| p > 0) {
            pos + p + 1
        } else {
            end
        };

        push_trimmed(&mut segments, &text[pos..split]);
        pos = split;
    }

    segments
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn push_trimmed(segments: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn next_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
