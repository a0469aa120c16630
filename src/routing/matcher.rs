//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse route paths into static, `:param` and trailing `*splat` segments
//! - Match request paths segment by segment, capturing parameters
//! - Produce a normalized key so `/users/:id` and `/users/:user_id` collide
//! - Join mount prefixes without letting a route escape its prefix
//!
//! # Design Decisions
//! - Matching is case-sensitive and segment-based; empty segments are ignored
//! - No regex: one pass over the segments
//! - A splat captures the rest of the path, possibly empty
//! - Captured values are percent-decoded; static segments compare as sent

use std::fmt;

use percent_encoding::percent_decode_str;

use crate::action::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Splat(String),
}

/// Why a path could not be used as a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub path: String,
    pub reason: &'static str,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route path \"{}\": {}", self.path, self.reason)
    }
}

impl std::error::Error for PatternError {}

/// A compiled route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        let invalid = |reason| PatternError {
            path: path.to_string(),
            reason,
        };

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("parameter without a name"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if i + 1 != parts.len() {
                    return Err(invalid("splat must be the last segment"));
                }
                Segment::Splat(if name.is_empty() { "splat" } else { name }.to_string())
            } else if *part == ".." || *part == "." {
                return Err(invalid("relative segments are not allowed"));
            } else {
                Segment::Static(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: render(&segments),
            segments,
        })
    }

    /// Normalized path, e.g. `/users/:id`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Identity for last-declared-wins: parameter names are erased.
    pub fn key(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Static(v) => format!("/{v}"),
                Segment::Param(_) => "/:".to_string(),
                Segment::Splat(_) => "/*".to_string(),
            })
            .collect()
    }

    /// Match `path`, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = Params::new();

        for segment in &self.segments {
            match segment {
                Segment::Static(expected) => {
                    if parts.next()? != expected {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), decode(parts.next()?));
                }
                Segment::Splat(name) => {
                    let rest: Vec<String> = parts.by_ref().map(decode).collect();
                    params.insert(name.clone(), rest.join("/"));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    /// Fill in parameters to produce a concrete path.
    pub fn expand(&self, params: &Params) -> Result<String, String> {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(v) => out.push_str(v),
                Segment::Param(name) | Segment::Splat(name) => {
                    let value = params.get(name).ok_or_else(|| name.clone())?;
                    out.push_str(value.trim_matches('/'));
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn render(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments
        .iter()
        .map(|s| match s {
            Segment::Static(v) => format!("/{v}"),
            Segment::Param(n) => format!("/:{n}"),
            Segment::Splat(n) => format!("/*{n}"),
        })
        .collect()
}

/// Decode one captured segment. Invalid UTF-8 is replaced, not rejected.
fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Concatenate a mount prefix and a route path.
///
/// The result always starts with `prefix`; relative segments are refused.
pub fn join(prefix: &str, path: &str) -> Result<String, PatternError> {
    if path.split('/').any(|s| s == ".." || s == ".") || prefix.split('/').any(|s| s == "..") {
        return Err(PatternError {
            path: format!("{prefix}{path}"),
            reason: "relative segments are not allowed",
        });
    }
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    };
    Ok(if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    })
}
