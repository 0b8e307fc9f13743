//! Statement normalization and fingerprinting.
//!
//! Two statements share a fingerprint iff they normalize to the same string.
//! Normalization, in order: `$<digits>` placeholders → `?`, integer literals
//! → `?`, single-quoted string literals (doubled quotes as escapes) → `?`,
//! whitespace collapsed to single spaces and trimmed.

use sha2::{Digest, Sha256};

/// Normalize a SQL statement to its query shape.
pub fn normalize(statement: &str) -> String {
    let bytes = statement.as_bytes();
    let mut out = String::with_capacity(statement.len());
    let mut i = 0;
    // Tracks whether the previous output byte was an identifier character,
    // so digits inside names (`users2`) survive while literals do not.
    let mut prev_ident = false;

    while i < bytes.len() {
        let c = bytes[i];

        // Single-quoted string literal; '' is an escaped quote.
        if c == b'\'' {
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            out.push('?');
            prev_ident = false;
            continue;
        }

        // $1, $2, … positional placeholders.
        if c == b'$' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push('?');
            prev_ident = false;
            continue;
        }

        // Integer literal (a digit run not glued to an identifier).
        if c.is_ascii_digit() && !prev_ident {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push('?');
            prev_ident = false;
            continue;
        }

        if c.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            out.push(' ');
            prev_ident = false;
            continue;
        }

        if c < 0x80 {
            out.push(c as char);
            prev_ident = c.is_ascii_alphanumeric() || c == b'_';
            i += 1;
        } else {
            let len = match c {
                0xc0..=0xdf => 2,
                0xe0..=0xef => 3,
                _ => 4,
            };
            out.push_str(&statement[i..(i + len).min(statement.len())]);
            prev_ident = false;
            i += len;
        }
    }

    out.trim().to_string()
}

/// Hex-encoded SHA-256 of the normalized statement.
pub fn fingerprint(statement: &str) -> String {
    hash(&normalize(statement))
}

/// Hex-encoded SHA-256 of already-normalized text.
pub fn hash(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_normalized() {
        assert_eq!(
            normalize("SELECT * FROM users WHERE id = $1 AND org = $23"),
            "SELECT * FROM users WHERE id = ? AND org = ?"
        );
    }

    #[test]
    fn test_integer_literals_normalized() {
        assert_eq!(
            normalize("SELECT * FROM users WHERE id = 42 LIMIT 10"),
            "SELECT * FROM users WHERE id = ? LIMIT ?"
        );
    }

    #[test]
    fn test_identifier_digits_survive() {
        assert_eq!(
            normalize("SELECT col1 FROM users2 WHERE id = 5"),
            "SELECT col1 FROM users2 WHERE id = ?"
        );
    }

    #[test]
    fn test_string_literals_normalized() {
        assert_eq!(
            normalize("SELECT * FROM users WHERE name = 'alice'"),
            "SELECT * FROM users WHERE name = ?"
        );
    }

    #[test]
    fn test_doubled_quote_escape_inside_literal() {
        assert_eq!(
            normalize("SELECT * FROM t WHERE name = 'O''Brien' AND x = 1"),
            "SELECT * FROM t WHERE name = ? AND x = ?"
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            normalize("  SELECT *\n   FROM users\t WHERE id = $1  "),
            "SELECT * FROM users WHERE id = ?"
        );
    }

    #[test]
    fn test_fingerprint_invariance() {
        let a = fingerprint("SELECT * FROM users WHERE id = $1");
        let b = fingerprint("SELECT * FROM users WHERE id = 42");
        let c = fingerprint("SELECT * FROM users WHERE id = 'abc'");
        let d = fingerprint("SELECT   *  FROM users WHERE id = $2");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn test_table_change_never_collapses() {
        let users = fingerprint("SELECT * FROM users WHERE id = $1");
        let orders = fingerprint("SELECT * FROM orders WHERE id = $1");
        assert_ne!(users, orders);
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint("SELECT 1");
        assert_eq!(fp.len(), 64);
        assert!(fp.bytes().all(|b| b.is_ascii_hexdigit()));
        // SHA-256 of the normalized text "SELECT ?".
        assert_eq!(fp, hash("SELECT ?"));
    }
}
