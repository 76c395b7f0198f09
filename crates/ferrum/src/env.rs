//! Machine environment: a mutable snapshot of process environment variables
//!
//! An [`Environment`] is an ordinary map, captured from the process
//! environment at machine construction. Children spawned through the machine
//! receive it verbatim; mutating it never touches the real process
//! environment.

use std::collections::HashMap;

use ferrum_path::LocalPath;

/// Separator between `PATH` entries.
const PATH_SEP: char = ':';

/// A machine's environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// An empty environment.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set several variables at once.
    pub fn update<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.set(k, v);
        }
    }

    /// The environment as a plain map.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// The current user, from `USER` or `USERNAME`.
    pub fn user(&self) -> Option<&str> {
        self.get("USER").or_else(|| self.get("USERNAME"))
    }

    /// The home directory, from `HOME` with the usual fallbacks.
    pub fn home(&self) -> Option<LocalPath> {
        if let Some(home) = self.get("HOME") {
            return Some(LocalPath::new(home));
        }
        if let Some(profile) = self.get("USERPROFILE") {
            return Some(LocalPath::new(profile));
        }
        if let Some(homepath) = self.get("HOMEPATH") {
            let drive = self.get("HOMEDRIVE").unwrap_or("");
            return Some(LocalPath::new(format!("{}{}", drive, homepath)));
        }
        None
    }

    pub fn set_home(&mut self, path: impl AsRef<str>) {
        let key = if self.contains("HOME") {
            "HOME"
        } else if self.contains("USERPROFILE") {
            "USERPROFILE"
        } else if self.contains("HOMEPATH") {
            "HOMEPATH"
        } else {
            "HOME"
        };
        self.set(key, path.as_ref());
    }

    /// `PATH` as a list of paths, in search order.
    pub fn path(&self) -> Vec<LocalPath> {
        self.get("PATH")
            .unwrap_or("")
            .split(PATH_SEP)
            .filter(|p| !p.is_empty())
            .map(|p| LocalPath::with_options(p, false))
            .collect()
    }

    /// Replace `PATH` with the given entries.
    pub fn set_path<I, P>(&mut self, entries: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<LocalPath>,
    {
        let joined = entries
            .into_iter()
            // search entries never keep a trailing slash
            .map(|p| LocalPath::with_options(p.into(), false).as_str().to_string())
            .collect::<Vec<_>>()
            .join(&PATH_SEP.to_string());
        self.set("PATH", joined);
    }

    /// Put a directory at the front of `PATH`.
    pub fn prepend_path(&mut self, entry: impl Into<LocalPath>) {
        let mut entries = self.path();
        entries.insert(0, entry.into());
        self.set_path(entries);
    }

    /// Put a directory at the back of `PATH`.
    pub fn append_path(&mut self, entry: impl Into<LocalPath>) {
        let mut entries = self.path();
        entries.push(entry.into());
        self.set_path(entries);
    }

    /// Expand `~`, `$VAR` and `${VAR}` in `text`. Unknown variables are left
    /// as-is, following shell-less expansion conventions.
    pub fn expand(&self, text: &str) -> String {
        let expanded = self.expand_vars(text);
        if let Some(rest) = expanded.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with('/') {
                if let Some(home) = self.home() {
                    return format!("{}{}", home, rest);
                }
            }
        }
        expanded
    }

    fn expand_vars(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.char_indices();
        while let Some((i, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let rest = &text[i + 1..];
            if let Some(inner) = rest.strip_prefix('{') {
                if let Some(end) = inner.find('}') {
                    let name = &inner[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    // skip past "{name}"
                    for _ in 0..end + 2 {
                        chars.next();
                    }
                    continue;
                }
                out.push('$');
                continue;
            }
            let name_len = rest
                .chars()
                .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                .count();
            if name_len == 0 || rest.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
                out.push('$');
                continue;
            }
            let name = &rest[..name_len];
            match self.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            for _ in 0..name_len {
                chars.next();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let mut env = Environment::empty();
        env.update(vars.iter().copied());
        env
    }

    #[test]
    fn basic_map_operations() {
        let mut env = env_with(&[("PATH", "/bin:/usr/bin")]);
        assert!(env.contains("PATH"));
        assert!(!env.contains("FOOBAR72"));
        assert_eq!(env.get("FOOBAR72"), None);
        env.set("FOOBAR72", "spam");
        assert_eq!(env.get("FOOBAR72"), Some("spam"));
        env.unset("FOOBAR72");
        assert!(!env.contains("FOOBAR72"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn path_splits_and_skips_empty_entries() {
        let env = env_with(&[("PATH", "/bin:/usr/bin:")]);
        let path = env.path();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], "/bin");
        assert_eq!(path[1], "/usr/bin");
    }

    #[test]
    fn path_edits_write_back() {
        let mut env = env_with(&[("PATH", "/bin:/usr/bin:")]);
        env.append_path("/sbin");
        assert_eq!(env.get("PATH"), Some("/bin:/usr/bin:/sbin"));
        env.prepend_path("/opt/bin");
        assert_eq!(env.get("PATH"), Some("/opt/bin:/bin:/usr/bin:/sbin"));
        env.set_path(["/only"]);
        assert_eq!(env.get("PATH"), Some("/only"));
        // trailing slashes on entries are normalized away
        let mut env = env_with(&[("PATH", "/bin")]);
        env.append_path("/sbin/");
        assert_eq!(env.get("PATH"), Some("/bin:/sbin"));
    }

    #[test]
    fn user_and_home_fallbacks() {
        let env = env_with(&[("USER", "alice")]);
        assert_eq!(env.user(), Some("alice"));
        let env = env_with(&[("USERNAME", "bob")]);
        assert_eq!(env.user(), Some("bob"));

        let env = env_with(&[("HOME", "/home/alice")]);
        assert_eq!(env.home().unwrap(), "/home/alice");
        let env = env_with(&[("HOMEDRIVE", "C:"), ("HOMEPATH", "/Users/bob")]);
        assert_eq!(env.home().unwrap(), "C:/Users/bob");
        assert_eq!(env_with(&[]).home(), None);
    }

    #[test]
    fn set_home_prefers_the_existing_key() {
        let mut env = env_with(&[("USERPROFILE", "/old")]);
        env.set_home("/new");
        assert_eq!(env.get("USERPROFILE"), Some("/new"));
        assert!(!env.contains("HOME"));
    }

    #[test]
    fn expand_table() {
        let mut env = env_with(&[("HOME", "/home/x")]);
        env.set("FERRUM_test", "butter");
        let tests = [
            ("", ""),
            ("foo", "foo"),
            ("foo$FERRUM_test", "foobutter"),
            ("foo${FERRUM_test}b", "foobutterb"),
            ("~", "/home/x"),
            ("~/notes", "/home/x/notes"),
        ];
        for (input, expected) in tests {
            assert_eq!(env.expand(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn expand_leaves_unknown_variables_alone() {
        let env = env_with(&[]);
        assert_eq!(env.expand("a$NOPE_b c"), "a$NOPE_b c");
        assert_eq!(env.expand("a${NOPE}c"), "a${NOPE}c");
        assert_eq!(env.expand("100$"), "100$");
        assert_eq!(env.expand("$1"), "$1");
    }
}
