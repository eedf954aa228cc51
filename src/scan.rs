//! Import specifier scanner.
//!
//! Scans module source for import/require specifiers without full parsing.
//! The reference pipeline uses this to walk the module graph; it is not a
//! syntax checker and deliberately ignores anything it cannot recognize.

use std::collections::HashSet;

use crate::hooks::ResolveKind;

/// Import found in source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Specifier exactly as written.
    pub specifier: String,
    /// Kind of import.
    pub kind: ResolveKind,
}

/// Scan source code for import/require specifiers.
///
/// Handles static `import ... from "..."`, side-effect `import "..."`,
/// `export ... from "..."`, dynamic `import("...")` and `require("...")`.
/// Line and block comments are skipped. Results come back in
/// first-appearance order, deduplicated by specifier.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<Import> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |spec: String, kind: ResolveKind, results: &mut Vec<Import>| {
        if !spec.is_empty() && seen.insert(spec.clone()) {
            results.push(Import {
                specifier: spec,
                kind,
            });
        }
    };

    let mut i = 0;
    while i < len {
        // Skip single-line comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Skip block comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if matches_keyword(&chars, i, "import") {
            let start = i;
            i += 6;
            if let Some((spec, kind, end)) = scan_import(&chars, i) {
                push(spec, kind, &mut results);
                i = end;
                continue;
            }
            i = start + 1;
            continue;
        }

        if matches_keyword(&chars, i, "export") {
            let start = i;
            i += 6;
            if let Some((spec, end)) = scan_export_from(&chars, i) {
                push(spec, ResolveKind::ImportStatement, &mut results);
                i = end;
                continue;
            }
            i = start + 1;
            continue;
        }

        if matches_keyword(&chars, i, "require") {
            let start = i;
            i += 7;
            if let Some((spec, end)) = scan_call_argument(&chars, i) {
                push(spec, ResolveKind::RequireCall, &mut results);
                i = end;
                continue;
            }
            i = start + 1;
            continue;
        }

        i += 1;
    }

    results
}

/// Check if chars at position match a keyword (with word boundaries).
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    let len = kw.len();

    if pos + len > chars.len() {
        return false;
    }
    if pos > 0 && (chars[pos - 1].is_alphanumeric() || chars[pos - 1] == '_') {
        return false;
    }
    for (j, &c) in kw.iter().enumerate() {
        if chars[pos + j] != c {
            return false;
        }
    }
    if pos + len < chars.len() && (chars[pos + len].is_alphanumeric() || chars[pos + len] == '_') {
        return false;
    }
    true
}

/// Scan after the `import` keyword. Returns (specifier, kind, end position).
fn scan_import(chars: &[char], start: usize) -> Option<(String, ResolveKind, usize)> {
    let len = chars.len();
    let mut i = skip_whitespace(chars, start);

    // Dynamic import: import("...")
    if i < len && chars[i] == '(' {
        let (spec, end) = scan_string(chars, skip_whitespace(chars, i + 1))?;
        return Some((spec, ResolveKind::DynamicImport, end));
    }

    // Static import: scan forward to `from "..."` or a direct string for
    // side-effect imports. Stop at the statement end.
    while i < len {
        if matches_keyword(chars, i, "from") {
            let j = skip_whitespace(chars, i + 4);
            let (spec, end) = scan_string(chars, j)?;
            return Some((spec, ResolveKind::ImportStatement, end));
        }
        if chars[i] == '"' || chars[i] == '\'' || chars[i] == '`' {
            let (spec, end) = scan_string(chars, i)?;
            return Some((spec, ResolveKind::ImportStatement, end));
        }
        if chars[i] == ';' {
            return None;
        }
        i += 1;
    }
    None
}

/// Scan after the `export` keyword for a `from "..."` clause.
fn scan_export_from(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    let mut i = start;

    while i < len {
        if matches_keyword(chars, i, "from") {
            let j = skip_whitespace(chars, i + 4);
            let (spec, end) = scan_string(chars, j)?;
            return Some((spec, end));
        }
        // A plain export has no source clause; give up at the statement end
        // or when another statement keyword begins.
        if chars[i] == ';' || matches_keyword(chars, i, "import") || matches_keyword(chars, i, "export")
        {
            return None;
        }
        i += 1;
    }
    None
}

/// Scan a `("...")` call argument, as in `require("...")`.
fn scan_call_argument(chars: &[char], start: usize) -> Option<(String, usize)> {
    let i = skip_whitespace(chars, start);
    if i >= chars.len() || chars[i] != '(' {
        return None;
    }
    scan_string(chars, skip_whitespace(chars, i + 1))
}

/// Scan a quoted string starting at `start`. Returns (contents, position
/// after the closing quote).
fn scan_string(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    if start >= len {
        return None;
    }
    let quote = chars[start];
    if quote != '"' && quote != '\'' && quote != '`' {
        return None;
    }

    let mut i = start + 1;
    let spec_start = i;
    while i < len && chars[i] != quote {
        if chars[i] == '\\' && i + 1 < len {
            i += 2;
            continue;
        }
        i += 1;
    }
    if i >= len {
        return None;
    }
    let spec: String = chars[spec_start..i].iter().collect();
    Some((spec, i + 1))
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}
