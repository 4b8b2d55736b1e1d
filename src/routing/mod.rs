//! Route matching: verbs, compiled path patterns and the ordered route table.

mod pattern;
mod table;

pub use pattern::RoutePattern;
pub use table::{Route, RouteSummary, RouteTable};

use crate::error::BootstrapError;
use hyper::Method;

/// HTTP verb an action answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Every method.
    All,
    Method(Method),
}

impl Verb {
    /// `GET` verb.
    pub fn get() -> Self {
        Verb::Method(Method::GET)
    }

    /// `POST` verb.
    pub fn post() -> Self {
        Verb::Method(Method::POST)
    }

    /// `PUT` verb.
    pub fn put() -> Self {
        Verb::Method(Method::PUT)
    }

    /// `PATCH` verb.
    pub fn patch() -> Self {
        Verb::Method(Method::PATCH)
    }

    /// `DELETE` verb.
    pub fn delete() -> Self {
        Verb::Method(Method::DELETE)
    }

    /// `HEAD` verb.
    pub fn head() -> Self {
        Verb::Method(Method::HEAD)
    }

    /// `OPTIONS` verb.
    pub fn options() -> Self {
        Verb::Method(Method::OPTIONS)
    }

    /// Parse a verb name. `*` and `all` select every method; unknown tokens
    /// become extension methods.
    pub fn parse(name: &str) -> Result<Self, BootstrapError> {
        match name.to_ascii_lowercase().as_str() {
            "*" | "all" => Ok(Verb::All),
            _ => Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map(Verb::Method)
                .map_err(|_| BootstrapError::InvalidMethod(name.to_string())),
        }
    }

    /// Whether a request with `method` is served by this verb. `GET` routes
    /// also answer `HEAD`.
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Verb::All => true,
            Verb::Method(m) => m == method || (*m == Method::GET && *method == Method::HEAD),
        }
    }

    /// Uppercase method name, or `ALL`.
    pub fn as_str(&self) -> &str {
        match self {
            Verb::All => "ALL",
            Verb::Method(m) => m.as_str(),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_parse() {
        assert_eq!(Verb::parse("get").unwrap(), Verb::get());
        assert_eq!(Verb::parse("POST").unwrap(), Verb::post());
        assert_eq!(Verb::parse("*").unwrap(), Verb::All);
        assert_eq!(Verb::parse("purge").unwrap().as_str(), "PURGE");
        assert!(Verb::parse("bad verb").is_err());
    }

    #[test]
    fn test_verb_matches() {
        assert!(Verb::get().matches(&Method::GET));
        assert!(Verb::get().matches(&Method::HEAD));
        assert!(!Verb::get().matches(&Method::POST));
        assert!(!Verb::head().matches(&Method::GET));
        assert!(Verb::All.matches(&Method::DELETE));
    }
}
