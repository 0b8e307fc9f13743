//! The `key=value` fields tokenizer.
//!
//! A fields region is a whitespace-separated run of pairs. Values come in
//! four shapes: double-quoted strings (recorded unescaped), balanced `{…}`,
//! balanced `[…]` (both recorded verbatim including delimiters), and bare
//! tokens up to the next whitespace.

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Byte offset of the first `<ident>=` token outside quotes and brackets.
///
/// Everything before the returned offset is the human-readable message;
/// everything from it onward is the fields region.
pub fn find_fields_start(text: &str) -> Option<usize> {
    let b = text.as_bytes();
    let mut i = 0;
    let mut in_quotes = false;
    let mut depth: i32 = 0;

    while i < b.len() {
        let c = b[i];
        if in_quotes {
            match c {
                b'\\' => i += 1, // skip the escaped byte
                b'"' => in_quotes = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        match c {
            b'"' => {
                in_quotes = true;
                i += 1;
            }
            b'{' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth = (depth - 1).max(0);
                i += 1;
            }
            _ if depth == 0 && is_ident_start(c) => {
                let start = i;
                while i < b.len() && is_ident_char(b[i]) {
                    i += 1;
                }
                if b.get(i) == Some(&b'=') {
                    return Some(start);
                }
                // Not a pair — rescan from the character that ended the ident.
            }
            _ => i += 1,
        }
    }
    None
}

/// Tokenize a fields region into `(key, value)` pairs, in order.
///
/// Tokens that are not `key=value` pairs are skipped; the caller applies
/// last-wins semantics for duplicate keys.
pub fn parse_fields(region: &str) -> Vec<(String, String)> {
    let b = region.as_bytes();
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < b.len() {
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= b.len() {
            break;
        }
        if !is_ident_start(b[i]) {
            // Garbage token — skip to the next whitespace.
            while i < b.len() && !b[i].is_ascii_whitespace() {
                i += 1;
            }
            continue;
        }

        let key_start = i;
        while i < b.len() && is_ident_char(b[i]) {
            i += 1;
        }
        if b.get(i) != Some(&b'=') {
            while i < b.len() && !b[i].is_ascii_whitespace() {
                i += 1;
            }
            continue;
        }
        let key = region[key_start..i].to_string();
        i += 1; // '='

        let (value, next) = match b.get(i) {
            Some(&b'"') => scan_quoted(region, i),
            Some(&b'{') => scan_balanced(region, i, b'{', b'}'),
            Some(&b'[') => scan_balanced(region, i, b'[', b']'),
            _ => scan_bare(region, i),
        };
        i = next;
        pairs.push((key, value));
    }
    pairs
}

/// Double-quoted value starting at the opening quote; returns the unescaped
/// contents and the offset past the closing quote.
fn scan_quoted(text: &str, start: usize) -> (String, usize) {
    let b = text.as_bytes();
    let mut value = String::new();
    let mut i = start + 1;
    while i < b.len() {
        match b[i] {
            b'"' => return (value, i + 1),
            b'\\' if i + 1 < b.len() => {
                match b[i + 1] {
                    b'n' => value.push('\n'),
                    b't' => value.push('\t'),
                    b'r' => value.push('\r'),
                    b'"' => value.push('"'),
                    b'\\' => value.push('\\'),
                    other => {
                        value.push('\\');
                        value.push(other as char);
                    }
                }
                i += 2;
            }
            _ => {
                // Copy the whole UTF-8 character, not just the lead byte.
                let ch_len = utf8_len(b[i]);
                value.push_str(&text[i..(i + ch_len).min(text.len())]);
                i += ch_len;
            }
        }
    }
    // Unterminated quote — take what we have.
    (value, i)
}

/// Balanced `{…}` / `[…]` value, recorded verbatim including delimiters.
/// Quote-aware: brackets inside double quotes do not count.
fn scan_balanced(text: &str, start: usize, open: u8, close: u8) -> (String, usize) {
    let b = text.as_bytes();
    let mut depth = 0;
    let mut in_quotes = false;
    let mut i = start;
    while i < b.len() {
        let c = b[i];
        if in_quotes {
            match c {
                b'\\' => i += 1,
                b'"' => in_quotes = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        match c {
            b'"' => in_quotes = true,
            _ if c == open => depth += 1,
            _ if c == close => {
                depth -= 1;
                if depth == 0 {
                    return (text[start..=i].to_string(), i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    // Unbalanced — take the rest verbatim.
    (text[start..].to_string(), i)
}

fn scan_bare(text: &str, start: usize) -> (String, usize) {
    let b = text.as_bytes();
    let mut i = start;
    while i < b.len() && !b[i].is_ascii_whitespace() {
        i += 1;
    }
    (text[start..i].to_string(), i)
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}
