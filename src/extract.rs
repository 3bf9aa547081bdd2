//! Address extraction from log lines
//!
//! A line is considered when it matches a regex. It is then split into
//! fields and one column is taken as the candidate address, optionally with
//! a fixed prefix and suffix removed.

use regex::Regex;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;

/// How a line is split into fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Separator {
    /// Runs of whitespace
    Whitespace,
    /// A literal separator string
    Literal(String),
}

impl Separator {
    /// Interpret a separator argument; a single space means "any whitespace"
    pub fn parse(arg: &str) -> Self {
        match arg {
            " " | "" => Separator::Whitespace,
            "\\t" => Separator::Literal("\t".to_string()),
            other => Separator::Literal(other.to_string()),
        }
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Separator::Whitespace => line.split_whitespace().collect(),
            Separator::Literal(sep) => line.split(sep.as_str()).collect(),
        }
    }
}

/// Extracts candidate addresses from log lines
#[derive(Debug, Clone)]
pub struct LineExtractor {
    pattern: Regex,
    separator: Separator,
    column: usize,
    lstrip: Option<String>,
    rstrip: Option<String>,
}

impl LineExtractor {
    /// Create an extractor for `column` (0-based) of lines matching `pattern`
    pub fn new(pattern: &str, separator: Separator, column: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            separator,
            column,
            lstrip: None,
            rstrip: None,
        })
    }

    /// Remove this prefix from the field when present
    pub fn lstrip(mut self, prefix: impl Into<String>) -> Self {
        self.lstrip = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    /// Remove this suffix from the field when present
    pub fn rstrip(mut self, suffix: impl Into<String>) -> Self {
        self.rstrip = Some(suffix.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Return the candidate field of a matching line
    pub fn field<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.trim();
        if !self.pattern.is_match(line) {
            return None;
        }
        let fields = self.separator.split(line);
        let mut field = fields.get(self.column)?.trim();
        if let Some(prefix) = &self.lstrip {
            field = field.strip_prefix(prefix.as_str()).unwrap_or(field);
        }
        if let Some(suffix) = &self.rstrip {
            field = field.strip_suffix(suffix.as_str()).unwrap_or(field);
        }
        Some(field)
    }

    /// Return the address of a matching line, if its field parses as one
    pub fn extract(&self, line: &str) -> Option<IpAddr> {
        self.field(line)?.parse().ok()
    }
}

/// Read all lines of a file, or only the last `tail` lines when non-zero
///
/// Invalid UTF-8 is replaced rather than treated as an error.
pub fn read_lines(path: &Path, tail: usize) -> io::Result<Vec<String>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut lines = VecDeque::new();
    for line in reader.split(b'\n') {
        let line = line?;
        let mut text = String::from_utf8_lossy(&line).into_owned();
        if text.ends_with('\r') {
            text.pop();
        }
        if tail > 0 && lines.len() == tail {
            lines.pop_front();
        }
        lines.push_back(text);
    }
    Ok(lines.into())
}
