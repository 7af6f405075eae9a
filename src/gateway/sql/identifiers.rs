//! Single-pass scanner that uppercases unquoted identifiers and rewrites
//! bare `'YYYY-MM-DD'` literals into `TO_DATE(...)` calls, while leaving
//! quoted identifiers, string contents, and comments byte-for-byte
//! untouched. Both transforms happen in the same pass because both need
//! exact knowledge of quote/comment boundaries to avoid false positives.

/// Result of normalizing one statement.
pub struct Normalized {
    pub sql: String,
    pub identifier_count: usize,
}

pub fn normalize(sql: &str) -> Normalized {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 16);
    let mut i = 0usize;
    let mut identifier_count = 0usize;
    // true at depth d if the d-th currently open '(' immediately follows
    // a `TO_DATE` token — lets us avoid re-wrapping a literal that's
    // already inside a TO_DATE(...) call on a second normalization pass.
    let mut paren_is_to_date: Vec<bool> = Vec::new();

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '\'' => {
                let (content, end) = scan_quoted(bytes, i, b'\'');
                let suppressed = paren_is_to_date.last().copied().unwrap_or(false);
                if !suppressed && is_bare_date(content) {
                    out.push_str("TO_DATE('");
                    out.push_str(content);
                    out.push_str("','YYYY-MM-DD')");
                } else {
                    out.push_str(&sql[i..end]);
                }
                i = end;
            }
            '"' => {
                let (_, end) = scan_quoted(bytes, i, b'"');
                out.push_str(&sql[i..end]);
                i = end;
            }
            '$' if is_dollar_quote_start(bytes, i) => {
                let end = scan_dollar_quoted(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = bytes[i..].iter().position(|&b| b == b'\n').map(|p| i + p).unwrap_or(bytes.len());
                out.push_str(&sql[i..end]);
                i = end;
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_block_comment_end(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i + 1;
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                    j += 1;
                }
                let word = &sql[start..j];
                let upper = word.to_ascii_uppercase();
                out.push_str(&upper);
                identifier_count += 1;
                i = j;
            }
            '(' => {
                let just_saw_to_date = out.trim_end().ends_with("TO_DATE");
                paren_is_to_date.push(just_saw_to_date);
                out.push('(');
                i += 1;
            }
            ')' => {
                paren_is_to_date.pop();
                out.push(')');
                i += 1;
            }
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    Normalized { sql: strip_trailing_semicolon(out), identifier_count }
}

/// A single-quoted string body matches exactly `YYYY-MM-DD` with no extra
/// characters before or after — the "false positive prevention" rule
/// (comments, partial strings, and strings with extra characters must not
/// be rewritten).
fn is_bare_date(content: &str) -> bool {
    let b = content.as_bytes();
    b.len() == 10
        && b[0..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
}

/// Scans a `'...'` or `"..."` token starting at `start` (which must point at
/// the opening quote), handling the doubled-quote escape (`''`/`\"\"`).
/// Returns the unquoted content and the offset just past the closing quote.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> (&str, usize) {
    let content_start = start + 1;
    let mut i = content_start;
    loop {
        match bytes.get(i) {
            None => return (std::str::from_utf8(&bytes[content_start..i]).unwrap_or(""), i),
            Some(&b) if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2; // escaped quote, keep scanning
                } else {
                    let content = std::str::from_utf8(&bytes[content_start..i]).unwrap_or("");
                    return (content, i + 1);
                }
            }
            _ => i += 1,
        }
    }
}

fn is_dollar_quote_start(bytes: &[u8], pos: usize) -> bool {
    // $$ or $tag$ where tag is [A-Za-z_][A-Za-z0-9_]*
    let mut j = pos + 1;
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    bytes.get(j) == Some(&b'$')
}

fn scan_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    let mut tag_end = start + 1;
    while tag_end < bytes.len() && (bytes[tag_end].is_ascii_alphanumeric() || bytes[tag_end] == b'_') {
        tag_end += 1;
    }
    let tag = &bytes[start..=tag_end]; // includes both $ delimiters
    let mut i = tag_end + 1;
    while i < bytes.len() {
        if bytes[i..].starts_with(tag) {
            return i + tag.len();
        }
        i += 1;
    }
    bytes.len()
}

fn find_block_comment_end(bytes: &[u8], start: usize) -> usize {
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

fn strip_trailing_semicolon(mut s: String) -> String {
    while s.ends_with(|c: char| c.is_whitespace()) {
        s.pop();
    }
    if s.ends_with(';') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_unquoted_identifiers() {
        let n = normalize("select id from users where name = 'bob'");
        assert_eq!(n.sql, "SELECT ID FROM USERS WHERE NAME = 'bob'");
    }

    #[test]
    fn preserves_quoted_identifier_case() {
        let n = normalize(r#"select "MixedCase" from "Tbl""#);
        assert_eq!(n.sql, r#"SELECT "MixedCase" FROM "Tbl""#);
    }

    #[test]
    fn rewrites_bare_date_literal() {
        let n = normalize("select * from t where d = '2024-01-15'");
        assert_eq!(n.sql, "SELECT * FROM T WHERE D = TO_DATE('2024-01-15','YYYY-MM-DD')");
    }

    #[test]
    fn does_not_rewrite_partial_or_longer_strings() {
        let n = normalize("select '2024-01-15 is a date' as s");
        assert_eq!(n.sql, "SELECT '2024-01-15 is a date' AS S");
    }

    #[test]
    fn does_not_touch_comments() {
        let n = normalize("select id -- 'not-a-date' 2024-01-15\nfrom t");
        assert!(n.sql.contains("-- 'not-a-date' 2024-01-15"));
    }

    #[test]
    fn strips_single_trailing_semicolon() {
        let n = normalize("select 1;");
        assert_eq!(n.sql, "SELECT 1");
    }

    #[test]
    fn is_idempotent_on_date_rewrite() {
        let once = normalize("select * from t where d = '2024-01-15'").sql;
        let twice = normalize(&once).sql;
        assert_eq!(once, twice);
    }

    #[test]
    fn dollar_quoted_body_is_untouched() {
        let n = normalize("select $tag$lower case body 2024-01-15$tag$");
        assert!(n.sql.contains("$tag$lower case body 2024-01-15$tag$"));
    }
}
