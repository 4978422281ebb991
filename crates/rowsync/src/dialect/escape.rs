//! Byte-class-driven literal escaping engines.
//!
//! Each dialect carries a 256-entry lookup table classifying every byte as
//! pass-through or needing an escape, plus a dialect-specific escape form:
//! backslash sequences for MySQL, E-string hex escapes for PostgreSQL, and
//! literal splicing around `CHAR(n)` for SQL Server, which has no in-string
//! escape at all. All engines share a "needs copy" fast path that scans the
//! input once before allocating, since the common case is fully safe.
//!
//! These engines serve the literal/script output path only; the execution
//! path binds values as parameters and never inlines escaped literals.

/// Per-byte classification table.
///
/// `true` marks bytes that can be copied into a quoted literal verbatim.
pub struct ByteClassTable {
    safe: [bool; 256],
}

impl ByteClassTable {
    /// Build a table where every byte is safe except the listed ones and,
    /// optionally, all control bytes (< 0x20) and 0x7f.
    pub fn new(unsafe_bytes: &[u8], controls_unsafe: bool) -> Self {
        let mut safe = [true; 256];
        if controls_unsafe {
            for b in 0..0x20 {
                safe[b] = false;
            }
            safe[0x7f] = false;
        }
        for &b in unsafe_bytes {
            safe[b as usize] = false;
        }
        Self { safe }
    }

    /// Fast path: scan without allocating.
    pub fn needs_escape(&self, bytes: &[u8]) -> bool {
        bytes.iter().any(|&b| !self.safe[b as usize])
    }

    /// Whether one byte is safe to copy through.
    pub fn is_safe(&self, b: u8) -> bool {
        self.safe[b as usize]
    }
}

fn mysql_table() -> &'static ByteClassTable {
    static TABLE: std::sync::OnceLock<ByteClassTable> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| ByteClassTable::new(&[0x00, b'\n', b'\r', b'\'', b'"', 0x1a, b'\\'], false))
}

fn pg_table() -> &'static ByteClassTable {
    static TABLE: std::sync::OnceLock<ByteClassTable> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| ByteClassTable::new(&[b'\'', b'\\'], true))
}

fn mssql_table() -> &'static ByteClassTable {
    // Non-ASCII bytes force the wide N'' prefix, so the table marks them too.
    static TABLE: std::sync::OnceLock<ByteClassTable> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut unsafe_bytes: Vec<u8> = vec![b'\''];
        unsafe_bytes.extend(0x80u8..=0xff);
        ByteClassTable::new(&unsafe_bytes, true)
    })
}

/// Escape a value as a MySQL single-quoted literal.
pub fn mysql_literal(bytes: &[u8]) -> String {
    let table = mysql_table();
    if !table.needs_escape(bytes) {
        let mut out = String::with_capacity(bytes.len() + 2);
        out.push('\'');
        out.push_str(&String::from_utf8_lossy(bytes));
        out.push('\'');
        return out;
    }

    // Escapes are inserted into the raw byte stream so multi-byte UTF-8
    // sequences pass through untouched.
    let mut out = Vec::with_capacity(bytes.len() + 8);
    out.push(b'\'');
    for &b in bytes {
        match b {
            0x00 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0x1a => out.extend_from_slice(b"\\Z"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    out.push(b'\'');
    String::from_utf8_lossy(&out).into_owned()
}

/// Escape a value as a PostgreSQL literal.
///
/// Plain `'...'` with doubled quotes when possible; an `E'...'` string with
/// backslash and `\xHH` escapes once control bytes or backslashes appear.
pub fn pg_literal(bytes: &[u8]) -> String {
    let table = pg_table();
    if !table.needs_escape(bytes) {
        let mut out = String::with_capacity(bytes.len() + 2);
        out.push('\'');
        out.push_str(&String::from_utf8_lossy(bytes));
        out.push('\'');
        return out;
    }

    let only_quotes = bytes
        .iter()
        .all(|&b| table.is_safe(b) || b == b'\'');
    if only_quotes {
        let mut out = Vec::with_capacity(bytes.len() + 4);
        out.push(b'\'');
        for &b in bytes {
            if b == b'\'' {
                out.extend_from_slice(b"''");
            } else {
                out.push(b);
            }
        }
        out.push(b'\'');
        return String::from_utf8_lossy(&out).into_owned();
    }

    let mut out = Vec::with_capacity(bytes.len() + 8);
    out.extend_from_slice(b"E'");
    for &b in bytes {
        match b {
            b'\'' => out.extend_from_slice(b"''"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b if !table.is_safe(b) => out.extend_from_slice(format!("\\x{:02x}", b).as_bytes()),
            b => out.push(b),
        }
    }
    out.push(b'\'');
    String::from_utf8_lossy(&out).into_owned()
}

/// Escape a binary value as a PostgreSQL bytea hex literal.
pub fn pg_binary_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 5);
    out.push_str("'\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out.push('\'');
    out
}

/// Escape a value as a SQL Server literal.
///
/// T-SQL has no universal in-string escape: quotes are doubled, control
/// bytes are spliced out of the literal as `+ CHAR(n) +`, and any non-ASCII
/// content switches the whole literal to the wide `N'...'` prefix (splicing
/// with `NCHAR(n)` for characters outside the literal).
pub fn mssql_literal(bytes: &[u8]) -> String {
    let table = mssql_table();
    if !table.needs_escape(bytes) {
        let mut out = String::with_capacity(bytes.len() + 2);
        out.push('\'');
        out.push_str(&String::from_utf8_lossy(bytes));
        out.push('\'');
        return out;
    }

    let text = String::from_utf8_lossy(bytes);
    let wide = text.chars().any(|c| !c.is_ascii());
    let prefix = if wide { "N'" } else { "'" };
    let splice_fn = if wide { "NCHAR" } else { "CHAR" };

    // Build a list of segments, splicing control characters out of the
    // quoted parts: 'ab' + CHAR(10) + 'cd'.
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let flush = |segments: &mut Vec<String>, current: &mut String| {
        if !current.is_empty() {
            segments.push(format!("{}{}'", prefix, current));
            current.clear();
        }
    };
    for c in text.chars() {
        if c.is_ascii_control() {
            flush(&mut segments, &mut current);
            segments.push(format!("{}({})", splice_fn, c as u32));
        } else if c == '\'' {
            current.push_str("''");
        } else {
            current.push(c);
        }
    }
    flush(&mut segments, &mut current);

    if segments.is_empty() {
        return format!("{}'", prefix);
    }
    segments.join(" + ")
}

/// Escape a binary value as a SQL Server hex literal (`0x...`).
pub fn mssql_binary_literal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0x".to_string();
    }
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

/// Escape a MySQL binary value as a hex literal (`X'...'`).
pub fn mysql_binary_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out.push('\'');
    out
}

/// Validate that bytes form text safe to render as a quoted literal.
///
/// This is standard UTF-8 validation with one exception: MySQL's legacy
/// 3-byte surrogate encoding (`0xED 0xA0..0xBF ..`) is accepted, because
/// such sequences were valid on the wire and must not be corrupted by a
/// round-trip through the dump path. Callers fall back to a hex/binary
/// literal when this returns false.
pub fn is_renderable_text(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let len = if b < 0x80 {
            1
        } else if (0xc2..=0xdf).contains(&b) {
            2
        } else if (0xe0..=0xef).contains(&b) {
            3
        } else if (0xf0..=0xf4).contains(&b) {
            4
        } else {
            return false;
        };
        if i + len > bytes.len() {
            return false;
        }
        for &cont in &bytes[i + 1..i + len] {
            if !(0x80..=0xbf).contains(&cont) {
                return false;
            }
        }
        match len {
            3 => {
                let b1 = bytes[i + 1];
                match b {
                    0xe0 if b1 < 0xa0 => return false,
                    // 0xed 0xa0..0xbf is a UTF-16 surrogate encoded as
                    // UTF-8; rejected by the standard but accepted here.
                    _ => {}
                }
            }
            4 => {
                let b1 = bytes[i + 1];
                if (b == 0xf0 && b1 < 0x90) || (b == 0xf4 && b1 > 0x8f) {
                    return false;
                }
            }
            _ => {}
        }
        i += len;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_escape_fast_path() {
        assert!(!mysql_table().needs_escape(b"hello world 123"));
        assert!(mysql_table().needs_escape(b"it's"));
        assert!(pg_table().needs_escape(b"a\nb"));
        assert!(!pg_table().needs_escape(b"plain"));
    }

    #[test]
    fn test_mysql_literal() {
        assert_eq!(mysql_literal(b"abc"), "'abc'");
        assert_eq!(mysql_literal(b"it's"), "'it\\'s'");
        assert_eq!(mysql_literal(b"a\nb"), "'a\\nb'");
        assert_eq!(mysql_literal(b"a\\b"), "'a\\\\b'");
        assert_eq!(mysql_literal(b"\x00"), "'\\0'");
    }

    #[test]
    fn test_pg_literal() {
        assert_eq!(pg_literal(b"abc"), "'abc'");
        assert_eq!(pg_literal(b"it's"), "'it''s'");
        assert_eq!(pg_literal(b"a\nb"), "E'a\\nb'");
        assert_eq!(pg_literal(b"a\x01b"), "E'a\\x01b'");
        assert_eq!(pg_binary_literal(&[0xde, 0xad]), "'\\xdead'");
    }

    #[test]
    fn test_literal_preserves_multibyte_text() {
        assert_eq!(mysql_literal("café's".as_bytes()), "'café\\'s'");
        assert_eq!(pg_literal("café's".as_bytes()), "'café''s'");
    }

    #[test]
    fn test_mssql_literal_splicing() {
        assert_eq!(mssql_literal(b"abc"), "'abc'");
        assert_eq!(mssql_literal(b"it's"), "'it''s'");
        assert_eq!(mssql_literal(b"a\nb"), "'a' + CHAR(10) + 'b'");
        assert_eq!(mssql_literal(b"\na"), "CHAR(10) + 'a'");
    }

    #[test]
    fn test_mssql_wide_literal() {
        let s = "caf\u{e9}".as_bytes();
        assert_eq!(mssql_literal(s), "N'caf\u{e9}'");
        let spliced = "a\n\u{e9}".as_bytes();
        assert_eq!(mssql_literal(spliced), "N'a' + NCHAR(10) + N'\u{e9}'");
    }

    #[test]
    fn test_binary_literals() {
        assert_eq!(mssql_binary_literal(&[0xab, 0x01]), "0xAB01");
        assert_eq!(mssql_binary_literal(&[]), "0x");
        assert_eq!(mysql_binary_literal(&[0xab]), "X'AB'");
    }

    #[test]
    fn test_is_renderable_text() {
        assert!(is_renderable_text(b"plain ascii"));
        assert!(is_renderable_text("日本語".as_bytes()));
        // Lone continuation byte is not text.
        assert!(!is_renderable_text(&[0x80]));
        // Truncated sequence.
        assert!(!is_renderable_text(&[0xe3, 0x81]));
        // Surrogate encoded as 3-byte UTF-8: rejected by std, accepted here.
        let surrogate = [0xed, 0xa0, 0xbd];
        assert!(std::str::from_utf8(&surrogate).is_err());
        assert!(is_renderable_text(&surrogate));
    }
}
