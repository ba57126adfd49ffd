//! Shell style glob matching against forward-slash relative paths.
//!
//! Supported special characters:
//! - `?` matches any single character, excluding the path separator
//! - `*` matches zero or more characters, excluding the path separator
//! - `**` matches zero or more characters, crossing path separators
//!
//! A backslash escapes the following character, with the exception of an
//! escaped backslash which normalizes to a forward slash. Everything else is
//! matched literally.

use crate::error::{AppError, Result};
use regex::Regex;
use std::fmt;

/// A compiled glob pattern.
///
/// `*.txt` matches `example.txt`, but not `childdir/example.txt`.
/// `**.txt` matches `example.txt` and `childdir/example.txt`.
/// `**/*.txt` matches `childdir/example.txt` but not `example.txt`.
/// `ex??.txt` matches `exam.txt`, but not `example.txt`.
#[derive(Debug, Clone)]
pub struct Glob {
    glob: String,
    pattern: Regex,
}

impl Glob {
    /// Compiles the glob, returning [`AppError::MalformedGlob`] if the
    /// resulting pattern is not a valid regex.
    pub fn new(glob: &str) -> Result<Self> {
        let pattern = Regex::new(&Self::translate(glob))
            .map_err(|_| AppError::MalformedGlob(glob.to_string()))?;
        Ok(Self { glob: glob.to_string(), pattern })
    }

    /// The raw glob string this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Returns whether the glob matches the given path string.
    ///
    /// Backslash separators are normalized to forward slashes before testing.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(&path.replace('\\', "/"))
    }

    /// Returns the anchored regex representation of the given glob pattern.
    pub fn translate(glob: &str) -> String {
        let mut pattern = String::with_capacity(glob.len() + 2);
        pattern.push('^');
        let mut chars = glob.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('\\') => pattern.push('/'),
                    Some(escaped) => pattern.push_str(&regex::escape(&escaped.to_string())),
                    None => break,
                },
                '?' => pattern.push_str("[^/]"),
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        // A `**/` prefix also matches zero components, so
                        // `**/*.txt` accepts `a.txt` as well as `a/b/c.txt`.
                        if chars.peek() == Some(&'/') {
                            chars.next();
                            pattern.push_str("(?:.*/)?");
                        } else {
                            pattern.push_str(".*");
                        }
                    } else {
                        pattern.push_str("[^/]*");
                    }
                }
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        pattern
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}
