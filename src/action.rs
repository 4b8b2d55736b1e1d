//! Action handlers, their results and the context they run in.

use crate::error::HttpError;
use crate::http::{ActionRequest, ByteStream};
use crate::metadata::{ActionMetadata, Instance};
use crate::params::Args;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use hyper::header::HeaderMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// What an action produced.
pub enum ActionResult {
    /// No value. Written with the "undefined" status, or falls through.
    Undefined,
    /// Explicit null. Written with the "null" status.
    Null,
    /// Structured value.
    Json(Value),
    /// Text value.
    Text(String),
    /// Raw binary.
    Bytes(Bytes),
    /// Streamed body.
    Stream(ByteStream),
}

impl ActionResult {
    /// Serialize any value into a JSON result.
    pub fn json<T: Serialize>(data: &T) -> Result<Self, HttpError> {
        let value = serde_json::to_value(data).map_err(|e| HttpError::internal(e.to_string()))?;
        Ok(ActionResult::Json(value))
    }

    /// Plain text result.
    pub fn text(content: impl Into<String>) -> Self {
        ActionResult::Text(content.into())
    }

    /// Binary result.
    pub fn bytes(content: impl Into<Bytes>) -> Self {
        ActionResult::Bytes(content.into())
    }

    /// Streaming result.
    pub fn stream(stream: ByteStream) -> Self {
        ActionResult::Stream(stream)
    }

    /// JSON view of the result, used for templates and redirect substitution.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            ActionResult::Json(v) => Some(v.clone()),
            ActionResult::Text(s) => Some(Value::String(s.clone())),
            ActionResult::Null => Some(Value::Null),
            _ => None,
        }
    }
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        ActionResult::Json(value)
    }
}

impl From<String> for ActionResult {
    fn from(value: String) -> Self {
        ActionResult::Text(value)
    }
}

impl From<&str> for ActionResult {
    fn from(value: &str) -> Self {
        ActionResult::Text(value.to_string())
    }
}

impl<T: Into<ActionResult>> From<Option<T>> for ActionResult {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ActionResult::Undefined)
    }
}

impl std::fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResult::Undefined => write!(f, "Undefined"),
            ActionResult::Null => write!(f, "Null"),
            ActionResult::Json(v) => write!(f, "Json({})", v),
            ActionResult::Text(s) => write!(f, "Text({:?})", s),
            ActionResult::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ActionResult::Stream(_) => write!(f, "Stream"),
        }
    }
}

type HandlerFn =
    dyn Fn(Instance, Args) -> BoxFuture<'static, Result<ActionResult, HttpError>> + Send + Sync;

/// Type-erased action handler invoked with the controller instance and its
/// positional arguments.
#[derive(Clone)]
pub struct ActionHandler(Arc<HandlerFn>);

impl ActionHandler {
    /// Invoke the handler with a controller instance and its arguments.
    pub fn call(&self, instance: Instance, args: Args) -> BoxFuture<'static, Result<ActionResult, HttpError>> {
        (self.0)(instance, args)
    }
}

impl std::fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActionHandler")
    }
}

/// Wrap an async function taking the controller `T` as an action handler.
pub fn handler<T, F, Fut>(f: F) -> ActionHandler
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult, HttpError>> + Send + 'static,
{
    let erased = move |instance: Instance, args: Args| -> BoxFuture<'static, Result<ActionResult, HttpError>> {
        match instance.downcast::<T>() {
            Ok(controller) => Box::pin(f(controller, args)),
            Err(_) => {
                let expected = std::any::type_name::<T>();
                Box::pin(async move {
                    Err(HttpError::internal(format!(
                        "Resolved controller instance is not a {}",
                        expected
                    )))
                })
            }
        }
    };
    ActionHandler(Arc::new(erased))
}

/// Status and headers an action sets on the outgoing response.
#[derive(Debug, Default)]
pub struct ResponseParts {
    pub status: Option<u16>,
    pub headers: HeaderMap,
}

/// Shared handle to the live response, injected into `response` parameters.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle(Arc<Mutex<ResponseParts>>);

impl ResponseHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response status.
    pub fn set_status(&self, status: u16) {
        self.0.lock().status = Some(status);
    }

    /// Set a response header. Invalid names or values are ignored.
    pub fn set_header(&self, key: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(key.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.0.lock().headers.insert(name, value);
        }
    }

    /// Status set so far, if any.
    pub fn status(&self) -> Option<u16> {
        self.0.lock().status
    }

    /// Take everything set so far, leaving the handle empty.
    pub fn take(&self) -> ResponseParts {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Everything collaborators know about the action being executed.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub request: Arc<ActionRequest>,
    pub response: ResponseHandle,
    pub action: Arc<ActionMetadata>,
}

impl ActionContext {
    /// Context for one action call with a fresh response handle.
    pub fn new(request: Arc<ActionRequest>, action: Arc<ActionMetadata>) -> Self {
        Self {
            request,
            response: ResponseHandle::new(),
            action,
        }
    }
}
