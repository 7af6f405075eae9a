//! Rewrites pgvector distance operators into IRIS vector function calls.
//! Runs after identifier normalization, so bare identifiers are already
//! uppercased. Operands can be identifiers, `$n` placeholders, bracketed
//! vector literals, or quoted string literals (`'[1,2,3]'::vector`); a
//! match is only accepted when the operator token itself sits outside any
//! string/comment range, so operator-looking text inside a literal is
//! left alone.

use regex::Regex;
use std::sync::OnceLock;

use super::segment::{is_protected, protected_ranges};

const OPERAND: &str = r"('(?:[^'\\]|'')*'(?:::\w+)?|\[[^\]]*\]|\$\d+|[A-Za-z0-9_.]+)";

fn compiled(op: &str) -> Regex {
    Regex::new(&format!(r"{OPERAND}\s*{op}\s*{OPERAND}")).unwrap()
}

fn cosine() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(r"<->"))
}

fn inner_product() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(r"<#>"))
}

fn cosine_distance() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(r"<=>"))
}

fn rewrite(sql: &str, re: &Regex, template: &str) -> String {
    let ranges = protected_ranges(sql);
    let mut out = String::with_capacity(sql.len());
    let mut last = 0usize;
    for caps in re.captures_iter(sql) {
        let whole = caps.get(0).unwrap();
        let op_pos = caps.get(1).unwrap().end();
        if is_protected(&ranges, op_pos) {
            continue;
        }
        out.push_str(&sql[last..whole.start()]);
        let mut expanded = String::new();
        caps.expand(template, &mut expanded);
        out.push_str(&expanded);
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    out
}

/// Translates `a <-> b`, `a <#> b`, `a <=> b` into the IRIS vector
/// function equivalents.
pub fn translate(sql: &str) -> String {
    let sql = rewrite(sql, cosine(), "VECTOR_COSINE($1, $2)");
    let sql = rewrite(&sql, inner_product(), "VECTOR_DOT_PRODUCT($1, $2)");
    rewrite(&sql, cosine_distance(), "(1 - VECTOR_COSINE($1, $2))")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_cosine_distance_operator() {
        let out = translate("SELECT * FROM T ORDER BY EMBEDDING <-> $1");
        assert_eq!(out, "SELECT * FROM T ORDER BY VECTOR_COSINE(EMBEDDING, $1)");
    }

    #[test]
    fn translates_inner_product_operator_with_quoted_literal_operand() {
        let out = translate("SELECT EMBEDDING <#> '[1,2,3]'::VECTOR");
        assert_eq!(out, "SELECT VECTOR_DOT_PRODUCT(EMBEDDING, '[1,2,3]'::VECTOR)");
    }

    #[test]
    fn leaves_operator_text_inside_strings_untouched() {
        let out = translate("SELECT 'x <-> y is not an operator here'");
        assert_eq!(out, "SELECT 'x <-> y is not an operator here'");
    }
}
