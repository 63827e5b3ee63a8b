//! Line-level Markdown structure: fenced code, inline code, ATX headings.

/// Tracks whether the scanner is inside a fenced code block.
#[derive(Debug, Default)]
pub struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Feeds one line; `true` when the line is a fence or fenced content.
    pub fn in_code(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if let Some((marker, len)) = self.open {
            let run = trimmed.chars().take_while(|c| *c == marker).count();
            if run >= len && trimmed[run * marker.len_utf8()..].trim().is_empty() {
                self.open = None;
            }
            return true;
        }
        for marker in ['`', '~'] {
            let run = trimmed.chars().take_while(|c| *c == marker).count();
            if run >= 3 {
                self.open = Some((marker, run));
                return true;
            }
        }
        false
    }
}

/// `(level, text)` for an ATX heading line.
pub fn heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let mut text = rest.trim();
    // Optional closing sequence: `## Title ##`.
    let without_closing = text.trim_end_matches('#');
    if without_closing.len() != text.len()
        && (without_closing.is_empty() || without_closing.ends_with([' ', '\t']))
    {
        text = without_closing.trim_end();
    }
    if text.is_empty() {
        return None;
    }
    Some((level as u8, text.to_string()))
}

/// Blanks out inline code spans with spaces, keeping byte offsets intact.
pub fn mask_inline_code(line: &str) -> String {
    if !line.contains('`') {
        return line.to_string();
    }
    let bytes = line.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open_len = run_length(bytes, i);
        let mut j = i + open_len;
        let mut closed = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let len = run_length(bytes, j);
                if len == open_len {
                    closed = Some(j + len);
                    break;
                }
                j += len;
            } else {
                j += 1;
            }
        }
        match closed {
            Some(end) => {
                out[i..end].fill(b' ');
                i = end;
            }
            None => i += open_len,
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| line.to_string())
}

fn run_length(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|b| **b == b'`').count()
}
