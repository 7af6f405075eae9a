//! Inlines a small, explicit allow-list of catalog functions and settings
//! that PG drivers probe on connect (`version()`, `current_schema()`, ...)
//! to literal constants, so the translator never has to round-trip these
//! to IRIS. Anything not on the list passes through unchanged — IRIS gets
//! to reject it if it's genuinely unsupported.

use regex::Regex;
use std::sync::OnceLock;

use super::segment::map_code_segments;

struct Rule {
    pattern: &'static str,
    replacement: &'static str,
}

// Identifiers are already uppercased by the time this pass runs.
const RULES: &[Rule] = &[
    Rule { pattern: r"VERSION\s*\(\s*\)", replacement: "'PostgreSQL 14.0 (iris-pgwire gateway)'" },
    Rule { pattern: r"CURRENT_SCHEMA\s*\(\s*\)", replacement: "CURRENT_SCHEMA" },
    Rule { pattern: r"CURRENT_DATABASE\s*\(\s*\)", replacement: "'IRIS'" },
    Rule { pattern: r"PG_BACKEND_PID\s*\(\s*\)", replacement: "CURRENT_CONNECTION_ID" },
    Rule { pattern: r"PG_TABLE_IS_VISIBLE\s*\([^)]*\)", replacement: "1" },
    Rule { pattern: r"PG_GET_USERBYID\s*\([^)]*\)", replacement: "'_SYSTEM'" },
];

fn compiled() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| RULES.iter().map(|r| Regex::new(r.pattern).unwrap()).collect())
}

pub fn inline(sql: &str) -> String {
    map_code_segments(sql, |code| {
        let mut code = code.to_string();
        for (re, rule) in compiled().iter().zip(RULES) {
            code = re.replace_all(&code, rule.replacement).into_owned();
        }
        code
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlines_version_call() {
        let out = inline("SELECT VERSION()");
        assert_eq!(out, "SELECT 'PostgreSQL 14.0 (iris-pgwire gateway)'");
    }

    #[test]
    fn leaves_unknown_functions_untouched() {
        let out = inline("SELECT SOME_OTHER_FN()");
        assert_eq!(out, "SELECT SOME_OTHER_FN()");
    }

    #[test]
    fn does_not_rewrite_inside_string_literals() {
        let out = inline("SELECT 'VERSION()'");
        assert_eq!(out, "SELECT 'VERSION()'");
    }
}
