//! Splits SQL text into alternating protected (string / quoted-identifier /
//! comment) and code byte ranges, so later passes (vector operator
//! rewriting, catalog function inlining) can run a regex over the code
//! ranges only, never touching literal content.

/// Byte ranges of `sql` that are inside a string literal, quoted
/// identifier, or comment — used by passes that need to match patterns
/// spanning into a literal (e.g. an operator followed by a quoted vector
/// literal) while still refusing to match entirely inside one.
pub fn protected_ranges(sql: &str) -> Vec<(usize, usize)> {
    let bytes = sql.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] as char {
            '\'' => {
                let end = skip_quoted(bytes, i, b'\'');
                ranges.push((i, end));
                i = end;
            }
            '"' => {
                let end = skip_quoted(bytes, i, b'"');
                ranges.push((i, end));
                i = end;
            }
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = bytes[i..].iter().position(|&b| b == b'\n').map(|p| i + p).unwrap_or(bytes.len());
                ranges.push((i, end));
                i = end;
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = skip_block_comment(bytes, i);
                ranges.push((i, end));
                i = end;
            }
            _ => i += 1,
        }
    }
    ranges
}

pub fn is_protected(ranges: &[(usize, usize)], pos: usize) -> bool {
    ranges.iter().any(|&(s, e)| pos >= s && pos < e)
}

pub fn map_code_segments(sql: &str, f: impl Fn(&str) -> String) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut code_start = 0usize;
    let mut i = 0usize;

    macro_rules! flush_code {
        ($end:expr) => {
            if $end > code_start {
                out.push_str(&f(&sql[code_start..$end]));
            }
        };
    }

    while i < bytes.len() {
        match bytes[i] as char {
            '\'' => {
                flush_code!(i);
                let end = skip_quoted(bytes, i, b'\'');
                out.push_str(&sql[i..end]);
                i = end;
                code_start = i;
            }
            '"' => {
                flush_code!(i);
                let end = skip_quoted(bytes, i, b'"');
                out.push_str(&sql[i..end]);
                i = end;
                code_start = i;
            }
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                flush_code!(i);
                let end = bytes[i..].iter().position(|&b| b == b'\n').map(|p| i + p).unwrap_or(bytes.len());
                out.push_str(&sql[i..end]);
                i = end;
                code_start = i;
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                flush_code!(i);
                let end = skip_block_comment(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
                code_start = i;
            }
            _ => i += 1,
        }
    }
    flush_code!(bytes.len());
    out
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    loop {
        match bytes.get(i) {
            None => return i,
            Some(&b) if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 1usize;
    let mut i = start + 2;
    while i < bytes.len() && depth > 0 {
        if bytes[i..].starts_with(b"/*") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"*/") {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_skips_string_contents() {
        let out = map_code_segments("a='x<->y' b", |s| s.replace("x<->y", "REPLACED"));
        assert_eq!(out, "a='x<->y' b");
    }

    #[test]
    fn transform_applies_to_code() {
        let out = map_code_segments("a<->b", |s| s.replace("<->", "DIST"));
        assert_eq!(out, "aDISTb");
    }
}
