//! Pulls a single SQL statement out of free-form model output.
//!
//! Grammar, in order:
//!
//! 1. Fenced code blocks (```` ```sql ... ``` ````) are searched first, in order of
//!    appearance; if none of them holds a statement the whole text is searched
//!    with the fence markers removed.
//! 2. A statement starts with `SELECT`, `INSERT`, `UPDATE`, `DELETE` or `WITH`
//!    (any case) at any word boundary. It is *anchored* when it begins a line,
//!    optionally after whitespace or an inline backtick, or follows a `label:`
//!    on the same line; otherwise it sits inside a sentence.
//! 3. It ends at the first `;` outside quotes (`'`, `"`, `` ` ``) with balanced
//!    parentheses. A line ending in `:` before that point means prose was
//!    swallowed and the candidate is dropped.
//! 4. The statement has to fit its keyword: `INSERT ... INTO`, `UPDATE ... SET`,
//!    `DELETE ... FROM`, `WITH ... SELECT|INSERT|UPDATE|DELETE`, and `SELECT`
//!    needs a select list. A `SELECT` inside a sentence also needs a `FROM`,
//!    so prose such as "select one; then..." is not taken for SQL.
//!
//! The first candidate that passes is returned trimmed, including its `;`.

use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid fenced block regex")
});
static FENCE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("valid fence marker regex"));
static STATEMENT_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(select|insert|update|delete|with)\b").expect("valid statement start regex")
});
static INTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\binto\b").expect("valid regex"));
static SET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bset\b").expect("valid regex"));
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("valid regex"));
static WITH_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\)\s*(select|insert|update|delete)\b").expect("valid regex")
});
static SELECT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^select\s+[^;\s]").expect("valid regex"));

/// Returns the first well-formed statement in `raw`, or `None` when the text
/// holds no SQL.
pub fn extract_sql(raw: &str) -> Option<String> {
    for block in FENCED_BLOCK_RE.captures_iter(raw) {
        if let Some(sql) = block.get(1).and_then(|m| first_statement(m.as_str())) {
            return Some(sql);
        }
    }

    let unfenced = FENCE_MARKER_RE.replace_all(raw, "\n");
    first_statement(&unfenced)
}

fn first_statement(text: &str) -> Option<String> {
    STATEMENT_START_RE.captures_iter(text).find_map(|caps| {
        let keyword = caps.get(1)?;
        let candidate = scan_statement(&text[keyword.start()..])?;
        let anchored = is_anchored(&text[..keyword.start()]);
        is_well_formed(&keyword.as_str().to_ascii_lowercase(), candidate, anchored)
            .then(|| candidate.trim().to_string())
    })
}

// True when only whitespace or backticks separate the keyword from the start
// of its line or from a preceding `label:`.
fn is_anchored(before: &str) -> bool {
    let line = before.rsplit('\n').next().unwrap_or_default();
    let lead = line.rsplit(':').next().unwrap_or_default();
    lead.chars().all(|c| c == ' ' || c == '\t' || c == '`' || c == '\r')
}

// Walks forward to the terminating semicolon.
fn scan_statement(text: &str) -> Option<&str> {
    let mut quote: Option<char> = None;
    let mut depth: i32 = 0;
    let mut last_significant: Option<char> = None;

    for (i, c) in text.char_indices() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            last_significant = Some(c);
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ';' => return (depth == 0).then(|| &text[..=i]),
            '\n' if depth == 0 && last_significant == Some(':') => return None,
            _ => {}
        }

        if !c.is_whitespace() {
            last_significant = Some(c);
        }
    }

    None
}

fn is_well_formed(keyword: &str, statement: &str, anchored: bool) -> bool {
    match keyword {
        "select" => {
            SELECT_LIST_RE.is_match(statement) && (anchored || FROM_RE.is_match(statement))
        }
        "insert" => INTO_RE.is_match(statement),
        "update" => SET_RE.is_match(statement),
        "delete" => FROM_RE.is_match(statement),
        "with" => WITH_BODY_RE.is_match(statement),
        _ => false,
    }
}
