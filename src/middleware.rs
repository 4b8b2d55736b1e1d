//! Middleware contracts shared by both drivers, plus the built-in CORS
//! middleware.

use crate::error::HttpError;
use crate::http::HttpContext;
use async_trait::async_trait;
use hyper::Method;
use serde::{Deserialize, Serialize};

/// Whether processing continues after a middleware ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next layer.
    Next,
    /// Stop here. The middleware is expected to have written the response.
    Halt,
}

/// Position of a middleware relative to the routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewareKind {
    Before,
    After,
}

/// A request middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut HttpContext) -> Result<Flow, HttpError>;
}

#[async_trait]
impl<F> Middleware for F
where
    F: Fn(&mut HttpContext) -> Result<Flow, HttpError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut HttpContext) -> Result<Flow, HttpError> {
        self(ctx)
    }
}

/// Receives errors when the default error handler is disabled.
#[async_trait]
pub trait ErrorMiddleware: Send + Sync {
    /// Return [`Flow::Halt`] once a response has been written.
    async fn handle_error(&self, error: &HttpError, ctx: &mut HttpContext) -> Flow;
}

#[async_trait]
impl<F> ErrorMiddleware for F
where
    F: Fn(&HttpError, &mut HttpContext) -> Flow + Send + Sync,
{
    async fn handle_error(&self, error: &HttpError, ctx: &mut HttpContext) -> Flow {
        self(error, ctx)
    }
}

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsOptions {
    /// Allowed origin. `*` allows any origin.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Methods announced on preflight requests.
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    /// Headers announced on preflight requests. `None` reflects the
    /// headers the client asked for.
    #[serde(default)]
    pub allowed_headers: Option<Vec<String>>,
    /// Response headers exposed to the client.
    #[serde(default)]
    pub exposed_headers: Vec<String>,
    /// Allow credentials.
    #[serde(default)]
    pub credentials: bool,
    /// Preflight cache duration in seconds.
    #[serde(default)]
    pub max_age: Option<u64>,
}

fn default_origin() -> String {
    "*".to_string()
}

fn default_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            methods: default_methods(),
            allowed_headers: None,
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: None,
        }
    }
}

impl CorsOptions {
    /// Allowed origin. Defaults to `*`.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Send `access-control-allow-credentials` and reflect the request
    /// origin when the allowed origin is `*`.
    pub fn credentials(mut self, credentials: bool) -> Self {
        self.credentials = credentials;
        self
    }

    /// Cache preflight responses for `seconds`.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

/// Sets CORS headers and answers preflight requests.
pub struct CorsMiddleware {
    options: CorsOptions,
}

impl CorsMiddleware {
    /// Middleware applying `options` to every request.
    pub fn new(options: CorsOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, ctx: &mut HttpContext) -> Result<Flow, HttpError> {
        let request = ctx.request.clone();
        let origin = match request.get_header("origin") {
            Some(origin) if self.options.origin == "*" && self.options.credentials => {
                origin.to_string()
            }
            _ => self.options.origin.clone(),
        };

        let response = &mut ctx.response;
        response.set_header("access-control-allow-origin", &origin);
        if origin != "*" {
            response.set_header("vary", "Origin");
        }
        if self.options.credentials {
            response.set_header("access-control-allow-credentials", "true");
        }
        if !self.options.exposed_headers.is_empty() {
            response.set_header(
                "access-control-expose-headers",
                &self.options.exposed_headers.join(","),
            );
        }

        if request.method != Method::OPTIONS {
            return Ok(Flow::Next);
        }

        response.set_header(
            "access-control-allow-methods",
            &self.options.methods.join(","),
        );
        let allowed = match &self.options.allowed_headers {
            Some(headers) => Some(headers.join(",")),
            None => request
                .get_header("access-control-request-headers")
                .map(str::to_string),
        };
        if let Some(allowed) = allowed {
            response.set_header("access-control-allow-headers", &allowed);
        }
        if let Some(max_age) = self.options.max_age {
            response.set_header("access-control-max-age", &max_age.to_string());
        }
        response.set_status(204);
        response.end();
        Ok(Flow::Halt)
    }
}
