const MAX_CAPTURE_LENGTH: usize = 15_000;
const MAX_BLOCKED_CONTENT_LENGTH: usize = 120;

/// Truncate captured stdout/stderr, keeping the head and tail of large output.
pub fn truncate_capture(output: &str) -> String {
    if output.len() <= MAX_CAPTURE_LENGTH {
        output.to_string()
    } else {
        let half = MAX_CAPTURE_LENGTH / 2;
        let start = &output[..floor_char_boundary(output, half)];
        let end = &output[ceil_char_boundary(output, output.len() - half)..];
        format!(
            "{}\n\n... [truncated {} chars] ...\n\n{}",
            start,
            output.len() - MAX_CAPTURE_LENGTH,
            end
        )
    }
}

/// Truncate content recorded in a violation so full payloads (or secrets
/// embedded in them) never land in the audit trail.
pub fn truncate_blocked_content(content: &str) -> String {
    if content.len() <= MAX_BLOCKED_CONTENT_LENGTH {
        content.to_string()
    } else {
        let cut = floor_char_boundary(content, MAX_BLOCKED_CONTENT_LENGTH);
        format!("{}...", &content[..cut])
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
