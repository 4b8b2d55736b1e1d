//! Compilation of `prefix + controller route + action route` into a single
//! anchored regular expression.
//!
//! Path templates follow the familiar express syntax:
//!
//! - `:name` captures one segment, `:name(\d+)` restricts it, `:name?` makes
//!   it optional together with its leading slash.
//! - `*` captures anything, including slashes.
//!
//! A route prefix additionally treats a whole `*` segment as exactly one
//! arbitrary segment and `*?` as zero or one. Regular expression parts are
//! embedded as they are, minus their anchors.
//!
//! Matching is case-insensitive and tolerates one trailing slash.

use crate::error::BootstrapError;
use crate::metadata::RouteSpec;
use regex::Regex;
use std::collections::HashMap;

/// A compiled route path.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    regex: Regex,
    display: String,
}

impl RoutePattern {
    /// Compile the full route of an action.
    pub fn compile(
        prefix: &RouteSpec,
        controller: &RouteSpec,
        action: &RouteSpec,
    ) -> Result<Self, BootstrapError> {
        let mut source = String::new();
        let mut display = String::new();

        match prefix {
            RouteSpec::Path(path) => {
                for segment in path.split('/').filter(|s| !s.is_empty()) {
                    match segment {
                        "*" => source.push_str("/[^/]+"),
                        "*?" => source.push_str("(?:/[^/]+)?"),
                        _ => source.push_str(&path_fragment(&format!("/{}", segment))),
                    }
                }
                display.push_str(&normalize(path));
            }
            other => push_part(other, &mut source, &mut display),
        }
        push_part(controller, &mut source, &mut display);
        push_part(action, &mut source, &mut display);

        if display.is_empty() {
            display.push('/');
        }

        let full = format!("(?i)^{}/?$", source);
        let regex = Regex::new(&full).map_err(|source| BootstrapError::InvalidRoute {
            pattern: display.clone(),
            source,
        })?;
        Ok(Self { regex, display })
    }

    /// Human readable route, e.g. `/api/users/:id`.
    pub fn path(&self) -> &str {
        &self.display
    }

    /// Source of the compiled expression.
    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    /// Match a request path, returning the decoded route parameters.
    /// Unnamed captures are keyed by their position, starting at `"0"`.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::new();
        let mut unnamed = 0;
        for (i, name) in self.regex.capture_names().enumerate().skip(1) {
            let key = match name {
                Some(name) => name.to_string(),
                None => {
                    let key = unnamed.to_string();
                    unnamed += 1;
                    key
                }
            };
            if let Some(m) = captures.get(i) {
                let value = urlencoding::decode(m.as_str())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_string());
                params.insert(key, value);
            }
        }
        Some(params)
    }
}

fn push_part(part: &RouteSpec, source: &mut String, display: &mut String) {
    match part {
        RouteSpec::None => {}
        RouteSpec::Path(path) => {
            let path = normalize(path);
            source.push_str(&path_fragment(&path));
            display.push_str(&path);
        }
        RouteSpec::Regex(regex) => {
            let inner = strip_anchors(regex.as_str());
            source.push_str(&format!("(?:{})", inner));
            display.push_str(inner);
        }
    }
}

/// Drop a leading `^` and an unescaped trailing `$`.
fn strip_anchors(source: &str) -> &str {
    let inner = source.strip_prefix('^').unwrap_or(source);
    match inner.strip_suffix('$') {
        Some(rest) if rest.chars().rev().take_while(|c| *c == '\\').count() % 2 == 0 => rest,
        _ => inner,
    }
}

/// Leading slash, no trailing slash. `/` itself becomes empty.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn path_fragment(path: &str) -> String {
    let chars: Vec<char> = path.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '/' if chars.get(i + 1) == Some(&':') => match param_fragment(&chars, i + 2, true) {
                Some((fragment, next)) => {
                    out.push_str(&fragment);
                    i = next;
                }
                None => {
                    out.push_str("/:");
                    i += 2;
                }
            },
            ':' => match param_fragment(&chars, i + 1, false) {
                Some((fragment, next)) => {
                    out.push_str(&fragment);
                    i = next;
                }
                None => {
                    out.push(':');
                    i += 1;
                }
            },
            '*' => {
                out.push_str("(.*)");
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                i += 1;
            }
        }
    }
    out
}

/// Parse `name(re)?` starting at `start`. Returns the fragment and the index
/// just past it, or `None` when no parameter name follows the colon.
fn param_fragment(chars: &[char], start: usize, with_slash: bool) -> Option<(String, usize)> {
    let mut i = start;
    let mut name = String::new();
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        name.push(chars[i]);
        i += 1;
    }
    if name.is_empty() {
        return None;
    }

    let mut capture = String::from("[^/]+?");
    if chars.get(i) == Some(&'(') {
        let mut depth = 0;
        let mut inner = String::new();
        while i < chars.len() {
            let c = chars[i];
            i += 1;
            match c {
                '(' => {
                    depth += 1;
                    if depth > 1 {
                        inner.push(c);
                    }
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    inner.push(c);
                }
                _ => inner.push(c),
            }
        }
        capture = inner;
    }

    let optional = chars.get(i) == Some(&'?');
    if optional {
        i += 1;
    }

    let group = format!("(?P<{}>{})", name, capture);
    let fragment = match (with_slash, optional) {
        (true, true) => format!("(?:/{})?", group),
        (true, false) => format!("/{}", group),
        (false, true) => format!("{}?", group),
        (false, false) => group,
    };
    Some((fragment, i))
}
