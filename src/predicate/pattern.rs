//! Segment patterns for paths and hosts.
//!
//! Syntax, per segment:
//! - `**` matches zero or more whole segments
//! - `{name}` matches exactly one non-empty segment
//! - `*` inside a segment matches any run of characters within that segment
//! - anything else matches literally
//!
//! Paths use `/` as the separator, hosts use `.`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Glob(String),
    Variable(String),
    AnySegments,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw == "**" {
            Segment::AnySegments
        } else if raw.len() > 2 && raw.starts_with('{') && raw.ends_with('}') {
            Segment::Variable(raw[1..raw.len() - 1].to_string())
        } else if raw.contains('*') {
            Segment::Glob(raw.to_string())
        } else {
            Segment::Literal(raw.to_string())
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == text,
            Segment::Glob(glob) => glob_match(glob.as_bytes(), text.as_bytes()),
            Segment::Variable(_) => !text.is_empty(),
            Segment::AnySegments => true,
        }
    }
}

/// A compiled path or host pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    separator: char,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn path(pattern: &str) -> Self {
        Self::compile(pattern, '/')
    }

    /// Host patterns compare case-insensitively.
    pub fn host(pattern: &str) -> Self {
        Self::compile(&pattern.to_ascii_lowercase(), '.')
    }

    fn compile(pattern: &str, separator: char) -> Self {
        let mut segments: Vec<Segment> = pattern.split(separator).map(Segment::parse).collect();
        // `**/**` matches exactly what `**` matches
        segments.dedup_by(|a, b| *a == Segment::AnySegments && *b == Segment::AnySegments);
        Self {
            source: pattern.to_string(),
            separator,
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn ends_with_separator(&self) -> bool {
        self.source.ends_with(self.separator)
    }

    pub fn matches(&self, text: &str) -> bool {
        let parts: Vec<&str> = text.split(self.separator).collect();
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Bottom-up table over (segment, part) suffixes: O(segments × parts) for any
/// number of `**`.
fn match_segments(pattern: &[Segment], text: &[&str]) -> bool {
    let n = text.len();
    // next[j]: the segments after the current one match text[j..]
    let mut next = vec![false; n + 1];
    next[n] = true;
    for segment in pattern.iter().rev() {
        let mut row = vec![false; n + 1];
        for j in (0..=n).rev() {
            row[j] = match segment {
                Segment::AnySegments => next[j] || (j < n && row[j + 1]),
                _ => j < n && next[j + 1] && segment.matches(text[j]),
            };
        }
        next = row;
    }
    next[0]
}

/// `*` wildcard match within a single segment.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_path() {
        let pattern = Pattern::path("/api/users");
        assert!(pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/users/1"));
        assert!(!pattern.matches("/api"));
    }

    #[test]
    fn test_double_wildcard() {
        let pattern = Pattern::path("/api/**");
        assert!(pattern.matches("/api"));
        assert!(pattern.matches("/api/"));
        assert!(pattern.matches("/api/v1/users/7"));
        assert!(!pattern.matches("/apix/v1"));

        let middle = Pattern::path("/a/**/z");
        assert!(middle.matches("/a/z"));
        assert!(middle.matches("/a/b/c/z"));
        assert!(!middle.matches("/a/b/c"));
    }

    #[test]
    fn test_many_double_wildcards_on_long_paths() {
        let pattern = Pattern::path("/**/a/**/b/**/c/**/d/**/e/**/f");
        assert_eq!(pattern.segments.iter().filter(|s| **s == Segment::AnySegments).count(), 6);

        let long = format!("/{}", vec!["x"; 400].join("/"));
        assert!(!pattern.matches(&long));

        let hit = format!("{long}/a/b/x/c/d/e/x/x/f");
        assert!(pattern.matches(&hit));
    }

    #[test]
    fn test_repeated_double_wildcard_collapses() {
        let pattern = Pattern::path("/api/**/**/**/z");
        assert_eq!(pattern.segments, Pattern::path("/api/**/z").segments);
        assert!(pattern.matches("/api/z"));
        assert!(pattern.matches("/api/q/r/z"));
        assert!(!pattern.matches("/api/q"));
    }

    #[test]
    fn test_single_segment_wildcards() {
        let pattern = Pattern::path("/files/*.json");
        assert!(pattern.matches("/files/report.json"));
        assert!(!pattern.matches("/files/a/report.json"));

        let variable = Pattern::path("/users/{id}/orders");
        assert!(variable.matches("/users/42/orders"));
        assert!(!variable.matches("/users//orders"));
    }

    #[test]
    fn test_host_pattern() {
        let pattern = Pattern::host("**.Example.org");
        assert!(pattern.matches("example.org"));
        assert!(pattern.matches("api.eu.example.org"));
        assert!(!pattern.matches("example.com"));

        let single = Pattern::host("{sub}.example.org");
        assert!(single.matches("beta.example.org"));
        assert!(!single.matches("example.org"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"a*c", b"abbbc"));
        assert!(glob_match(b"*", b""));
        assert!(!glob_match(b"a*d", b"abc"));
    }
}
