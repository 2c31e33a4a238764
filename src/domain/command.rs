//! Structured host commands.
//!
//! Commands are kept as a program plus an argument vector. Local hosts spawn
//! them directly; remote hosts render them into a single shell line where
//! every word is quoted, except that a leading `~/` stays unquoted so the
//! remote shell still expands it.

use std::fmt;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument only when `value` is present
    pub fn opt_arg(self, value: Option<String>) -> Self {
        match value {
            Some(value) => self.arg(value),
            None => self,
        }
    }

    /// Render as a POSIX shell command line
    pub fn to_shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| shell_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Quote a string for the shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote a word, leaving a leading `~/` expandable
pub fn shell_word(word: &str) -> String {
    if word == "~" {
        return word.to_string();
    }
    match word.strip_prefix("~/") {
        Some("") => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None if is_plain(word) => word.to_string(),
        None => shell_quote(word),
    }
}

fn is_plain(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
}
