//! Backend-neutral request representation seen by middlewares and actions.

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A file attached to the request by an upload middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field the file was sent under.
    pub field_name: String,
    /// Original file name, if the client sent one.
    pub file_name: Option<String>,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Uploaded file from form field `field_name`.
    pub fn new(field_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: None,
            content_type: None,
            data: data.into(),
        }
    }

    /// Set the client-side file name.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Set the declared content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// HTTP request as delivered to the action pipeline.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// HTTP method.
    pub method: Method,
    /// Request URL (path and query) as received.
    pub url: String,
    /// Path component of the URL.
    pub path: String,
    /// Decoded query pairs in order of appearance.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Route parameters captured by the matched route.
    pub params: HashMap<String, String>,
    /// Request body.
    pub body: Option<Bytes>,
    /// Session data, populated by a session middleware.
    pub session: Option<Map<String, Value>>,
    /// Per-request state shared between middlewares and actions.
    pub state: Map<String, Value>,
    /// Files populated by an upload middleware.
    pub files: Vec<UploadedFile>,
}

impl ActionRequest {
    /// Create a new request for the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (url.clone(), Vec::new()),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        Self {
            method,
            url,
            path,
            query,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            body: None,
            session: None,
            state: Map::new(),
            files: Vec::new(),
        }
    }

    /// Add a header to the request. Invalid names or values are ignored.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach session data.
    pub fn session(mut self, session: Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }

    /// Get a header value (case-insensitive).
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// All headers as a JSON object with lowercase names.
    pub fn headers_object(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, value) in &self.headers {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str().to_string(), Value::String(v.to_string()));
            }
        }
        out
    }

    /// Every value supplied for a query key.
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Query string as a JSON object; repeated keys become arrays.
    pub fn query_object(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in &self.query {
            let value = Value::String(value.clone());
            match out.get_mut(key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    out.insert(key.clone(), value);
                }
            }
        }
        out
    }

    /// Cookies parsed from the `Cookie` header(s).
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(hyper::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let value = v.trim().trim_matches('"');
                let value = urlencoding::decode(value)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                Some((k.trim().to_string(), value))
            })
            .collect()
    }

    /// Get a single cookie value.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Route parameters as a JSON object.
    pub fn params_object(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    /// Get the body as text if present. Fails on invalid UTF-8.
    pub fn text(&self) -> Option<Result<&str, std::str::Utf8Error>> {
        self.body.as_ref().map(|b| std::str::from_utf8(b))
    }

    /// Parse the body as JSON if present.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.body.as_ref().map(|b| serde_json::from_slice(b))
    }
}

impl Default for ActionRequest {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ActionRequest::new(Method::POST, "/api/test?limit=10")
            .header("Content-Type", "application/json")
            .body(r#"{"key": "value"}"#);

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/api/test");
        assert_eq!(request.get_header("content-type"), Some("application/json"));
        assert_eq!(request.query_values("limit"), vec!["10"]);
        assert!(request.body.is_some());
    }

    #[test]
    fn test_query_object_collects_repeated_keys() {
        let request = ActionRequest::new(Method::GET, "/items?id=1&id=2&name=a%20b");
        let query = request.query_object();
        assert_eq!(query["id"], serde_json::json!(["1", "2"]));
        assert_eq!(query["name"], serde_json::json!("a b"));
    }

    #[test]
    fn test_cookie_parsing() {
        let request = ActionRequest::new(Method::GET, "/")
            .header("Cookie", "token=abc%20def; theme=dark");
        assert_eq!(request.cookie("token"), Some("abc def".to_string()));
        assert_eq!(request.cookie("theme"), Some("dark".to_string()));
        assert_eq!(request.cookie("missing"), None);
    }
}
