//! Error taxonomy for actions and bootstrap.
//!
//! Every error raised while executing an action is an [`HttpError`]: a status
//! code, a name (the "kind" of error, used for override lookups and JSON
//! output), a message and optional extra properties.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

/// HTTP-aware error produced anywhere in the action pipeline.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// HTTP status code.
    pub status: u16,
    /// Error name (e.g. `NotFoundError`).
    pub name: Cow<'static, str>,
    /// Human readable message.
    pub message: String,
    /// Extra properties serialized next to `name` and `message`.
    pub properties: Map<String, Value>,
    /// Replacement JSON body. When set, it is serialized verbatim and nothing
    /// else about the error is exposed.
    pub json_body: Option<Value>,
    /// Captured backtrace, only exposed in development mode.
    pub stack: Option<String>,
}

impl HttpError {
    /// Create a new error with the given status code.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self::named(status, "HttpError", message)
    }

    /// Create an error with an explicit name.
    pub fn named(
        status: u16,
        name: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        let backtrace = std::backtrace::Backtrace::capture();
        let stack = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            status,
            name: name.into(),
            message: message.into(),
            properties: Map::new(),
            json_body: None,
            stack,
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::named(400, "BadRequestError", message)
    }

    /// Create a 401 Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::named(401, "UnauthorizedError", message)
    }

    /// Create a 403 Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::named(403, "ForbiddenError", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::named(404, "NotFoundError", message)
    }

    /// Create a 405 Method Not Allowed error.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::named(405, "MethodNotAllowedError", message)
    }

    /// Create a 406 Not Acceptable error.
    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::named(406, "NotAcceptableError", message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self::named(422, "UnprocessableEntityError", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::named(500, "InternalServerError", message)
    }

    /// Raised when an authorized action is requested without credentials.
    pub fn authorization_required(method: &str, url: &str) -> Self {
        Self::named(
            401,
            "AuthorizationRequiredError",
            format!("Authorization is required for request on {} {}", method, url),
        )
    }

    /// Raised when the authorization checker denies an action requiring roles.
    pub fn access_denied(method: &str, url: &str) -> Self {
        Self::named(
            403,
            "AccessDeniedError",
            format!("Access is denied for request on {} {}", method, url),
        )
    }

    /// Raised when a required parameter is absent from the request.
    pub fn param_required(kind_label: &str, name: Option<&str>, method: &str, url: &str) -> Self {
        let subject = match name {
            Some(name) => format!("{} \"{}\"", kind_label, name),
            None => kind_label.to_string(),
        };
        let mut err = Self::named(
            400,
            "ParamRequiredError",
            format!("{} is required for request on {} {}", subject, method, url),
        );
        if let Some(name) = name {
            err = err.with_property("paramName", Value::String(name.to_string()));
        }
        err
    }

    /// Raised when a raw parameter value cannot be converted to its target type.
    pub fn param_normalization(name: &str, value: &str, target: &str) -> Self {
        Self::named(
            400,
            "ParamNormalizationError",
            format!(
                "Given parameter {} is invalid. Value ({}) cannot be parsed into {}.",
                name, value, target
            ),
        )
        .with_property("paramName", Value::String(name.to_string()))
        .with_property("value", Value::String(value.to_string()))
        .with_property("targetType", Value::String(target.to_string()))
    }

    /// Raised when a transformed parameter fails validation.
    pub fn validation_failed(target: &str, failures: Vec<ValidationFailure>) -> Self {
        let errors = serde_json::to_value(&failures).unwrap_or(Value::Array(Vec::new()));
        Self::bad_request(format!(
            "Invalid {}, check 'errors' property for more info.",
            target
        ))
        .with_property("errors", errors)
    }

    /// Authorized actions exist but no checker has been configured.
    pub fn authorization_checker_not_defined() -> Self {
        Self::named(
            500,
            "AuthorizationCheckerNotDefinedError",
            "Cannot use authorized actions: no authorization checker is configured.",
        )
    }

    /// A current-user parameter exists but no checker has been configured.
    pub fn current_user_checker_not_defined() -> Self {
        Self::named(
            500,
            "CurrentUserCheckerNotDefinedError",
            "Cannot use current-user parameters: no current user checker is configured.",
        )
    }

    /// Attach an extra serialized property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Replace the serialized JSON body entirely.
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    /// Apply a configured override (message and/or status) for this error name.
    pub fn apply_override(&mut self, overrides: &HashMap<String, ErrorOverride>) {
        if let Some(o) = overrides.get(self.name.as_ref()) {
            if let Some(status) = o.status {
                self.status = status;
            }
            if let Some(message) = &o.message {
                self.message = message.clone();
            }
        }
    }

    /// JSON representation used by JSON controllers.
    pub fn to_json(&self, development: bool) -> Value {
        if let Some(body) = &self.json_body {
            return body.clone();
        }

        let mut out = Map::new();
        out.insert("name".into(), Value::String(self.name.to_string()));
        out.insert("message".into(), Value::String(self.message.clone()));
        for (k, v) in &self.properties {
            out.insert(k.clone(), v.clone());
        }
        if development {
            out.insert("stack".into(), Value::String(self.stack_text()));
        }
        Value::Object(out)
    }

    /// Text representation used by default controllers.
    pub fn to_text(&self, development: bool) -> String {
        if development {
            self.stack_text()
        } else {
            self.message.clone()
        }
    }

    fn stack_text(&self) -> String {
        match &self.stack {
            Some(stack) => format!("{}: {}\n{}", self.name, self.message, stack),
            None => format!("{}: {}", self.name, self.message),
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.name, self.message)
    }
}

impl std::error::Error for HttpError {}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::bad_request(err.to_string())
    }
}

/// Replacement applied to errors of a given name before serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorOverride {
    /// Replacement message.
    pub message: Option<String>,
    /// Replacement status code.
    pub status: Option<u16>,
}

/// A single structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationFailure {
    /// Offending property.
    pub property: String,
    /// Constraint name mapped to its message.
    pub constraints: std::collections::BTreeMap<String, String>,
}

impl ValidationFailure {
    /// Failure of one `constraint` on `property`.
    pub fn new(
        property: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut constraints = std::collections::BTreeMap::new();
        constraints.insert(constraint.into(), message.into());
        Self {
            property: property.into(),
            constraints,
        }
    }
}

/// Errors raised while compiling metadata and installing routes.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidRoute {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid route prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },
    #[error("unknown HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("controller pattern '{pattern}' could not be loaded: {reason}")]
    Loader { pattern: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
