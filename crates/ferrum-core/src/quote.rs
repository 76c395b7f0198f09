//! Shell quoting with `sh`-like escaping rules
//!
//! Quoting is only cosmetic for spawning (argument vectors are handed to the
//! OS verbatim); it matters when a rendered command line is re-parsed by a
//! sub-shell, e.g. a command passed as an argument to `ssh`.

/// Characters that never need quoting.
const SAFE_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@%_-+=:,./";

/// Characters that must be backslash-escaped inside double quotes.
const FUNNY_CHARS: &str = "\"`$\\";

/// Quote `text` so that `sh` would parse it back as a single word.
///
/// - the empty string renders as `''`
/// - text made only of safe characters is returned unchanged
/// - text without a single-quote is wrapped in single quotes
/// - anything else is wrapped in double quotes, with `"`, `` ` ``, `$` and
///   `\` backslash-escaped
pub fn sh_quote(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    if text.chars().all(|c| SAFE_CHARS.contains(c)) {
        return text.to_string();
    }
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if FUNNY_CHARS.contains(c) {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Quote every item of an argument vector.
pub fn sh_quote_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| sh_quote(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_text_is_unchanged() {
        for text in ["ls", "-la", "/usr/bin/env", "a,b:c.d", "100%", "x+y=z"] {
            assert_eq!(sh_quote(text), text);
        }
    }

    #[test]
    fn empty_text_renders_as_empty_quotes() {
        assert_eq!(sh_quote(""), "''");
    }

    #[test]
    fn unsafe_text_without_single_quote_is_single_quoted() {
        assert_eq!(sh_quote("&&"), "'&&'");
        assert_eq!(sh_quote("hello world"), "'hello world'");
        assert_eq!(sh_quote("a$b"), "'a$b'");
        assert_eq!(sh_quote("a;b"), "'a;b'");
    }

    #[test]
    fn text_with_single_quote_is_double_quoted_and_escaped() {
        assert_eq!(sh_quote("'&&'"), "\"'&&'\"");
        assert_eq!(sh_quote("don't"), "\"don't\"");
        assert_eq!(sh_quote("it's $HOME"), "\"it's \\$HOME\"");
        assert_eq!(sh_quote("a'\\b"), "\"a'\\\\b\"");
        assert_eq!(sh_quote("`it's`"), "\"\\`it's\\`\"");
    }

    #[test]
    fn quoting_is_idempotent_for_safe_text() {
        let once = sh_quote("plain");
        assert_eq!(sh_quote(&once), once);
    }

    #[test]
    fn quote_list_quotes_each_item() {
        let quoted = sh_quote_list(["ls", "a b"]);
        assert_eq!(quoted, vec!["ls".to_string(), "'a b'".to_string()]);
    }
}
