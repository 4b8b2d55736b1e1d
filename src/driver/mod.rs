//! Backend drivers.
//!
//! A driver owns the middleware chain and the route table, turns inbound
//! requests into [`HttpContext`]s, extracts parameter values and writes
//! results. Two drivers ship with the crate:
//!
//! - [`HyperDriver`]: linear chain, served directly on hyper's HTTP/1 stack.
//! - [`TowerDriver`]: nested chain exposed as a `tower::Service`.

mod server;
mod service;

pub use server::HyperDriver;
pub use service::{TowerDriver, TowerService};

use crate::action::{ActionContext, ActionResult};
use crate::config::RoutingSettings;
use crate::error::HttpError;
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::http::{
    ActionRequest, ActionResponse, HttpContext, BINARY_CONTENT_TYPE, HTML_CONTENT_TYPE,
    JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE,
};
use crate::metadata::{ActionMetadata, ParamKind, ParamMetadata};
use crate::middleware::{ErrorMiddleware, Flow, Middleware, MiddlewareKind};
use crate::params::ParamValue;
use crate::routing::{RoutePattern, RouteSummary, Verb};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Contract between bootstrap, the executor and an HTTP backend.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Receive the settings the driver needs at request time.
    fn configure(&mut self, settings: Arc<RoutingSettings>);

    fn register_middleware(&mut self, kind: MiddlewareKind, middleware: Arc<dyn Middleware>);

    /// Error middlewares run when the default error handler is disabled.
    fn register_error_middleware(&mut self, middleware: Arc<dyn ErrorMiddleware>);

    /// Append a route. Routes are matched in registration order.
    fn register_route(&mut self, route: RouteRegistration);

    fn routes(&self) -> Vec<RouteSummary>;

    /// Extract the raw value of a parameter from the request. Fails only
    /// when the body cannot be read as the parameter requires.
    fn param_from_request(
        &self,
        action: &ActionContext,
        param: &ParamMetadata,
    ) -> Result<ParamValue, HttpError>;

    /// Write a successful result. Status and headers are already set.
    fn write_success(&self, ctx: &mut HttpContext, action: &ActionMetadata, result: ActionResult);

    /// Write an error response.
    fn write_error(&self, ctx: &mut HttpContext, action: Option<&ActionMetadata>, error: HttpError);
}

/// Executes one action for a route.
#[derive(Clone)]
pub struct RouteHandler {
    executor: Arc<ActionExecutor>,
    action: Arc<ActionMetadata>,
}

impl RouteHandler {
    /// Bind `action` to the executor running it.
    pub fn new(executor: Arc<ActionExecutor>, action: Arc<ActionMetadata>) -> Self {
        Self { executor, action }
    }

    /// Action served by this handler.
    pub fn action(&self) -> &Arc<ActionMetadata> {
        &self.action
    }

    /// Run the action against `ctx`.
    pub async fn handle(
        &self,
        driver: &dyn Driver,
        ctx: &mut HttpContext,
    ) -> Result<ActionOutcome, HttpError> {
        self.executor.execute(driver, &self.action, ctx).await
    }
}

/// Everything a driver needs to register one route.
pub struct RouteRegistration {
    pub verb: Verb,
    pub pattern: RoutePattern,
    pub action_id: String,
    pub before: Vec<Arc<dyn Middleware>>,
    pub handler: RouteHandler,
    pub after: Vec<Arc<dyn Middleware>>,
}

/// Per-route payload stored in a driver's route table.
pub(crate) struct RouteEntry {
    pub before: Vec<Arc<dyn Middleware>>,
    pub handler: RouteHandler,
    pub after: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("action", &self.handler.action.id())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// Run middlewares in order. Returns `false` once one halts.
pub(crate) async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    ctx: &mut HttpContext,
) -> Result<bool, HttpError> {
    for middleware in chain {
        if middleware.handle(ctx).await? == Flow::Halt {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Write an error that escaped the action executor.
///
/// With the default error handler disabled, the error middlewares get the
/// first chance to respond. If none does, a bare status and message are sent.
pub(crate) async fn dispatch_error(
    driver: &dyn Driver,
    settings: &RoutingSettings,
    error_middlewares: &[Arc<dyn ErrorMiddleware>],
    ctx: &mut HttpContext,
    error: HttpError,
) {
    if settings.default_error_handler {
        driver.write_error(ctx, None, error);
        return;
    }

    for middleware in error_middlewares {
        if middleware.handle_error(&error, ctx).await == Flow::Halt {
            return;
        }
    }
    if !ctx.response.written {
        warn!("Unhandled {}: {}", error.name, error.message);
        ctx.response.set_status(error.status);
        ctx.response.set_header(CONTENT_TYPE.as_str(), TEXT_CONTENT_TYPE);
        ctx.response.send(error.message);
    }
}

/// Convert a hyper request into an [`ActionRequest`], buffering the body.
pub async fn read_request<B>(req: Request<B>, max_body_size: usize) -> Result<ActionRequest, HttpError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut request = ActionRequest::new(parts.method, url);
    request.headers = parts.headers;

    let bytes = body
        .collect()
        .await
        .map_err(|e| HttpError::bad_request(format!("Failed to read request body: {}", e)))?
        .to_bytes();
    if bytes.len() > max_body_size {
        return Err(HttpError::named(413, "PayloadTooLargeError", "Request body too large"));
    }
    if !bytes.is_empty() {
        request.body = Some(bytes);
    }
    Ok(request)
}

/// Parameter extraction shared by both drivers.
///
/// Header, query, cookie and route values never fail. Body values fail with
/// a normalization error when the body is not valid UTF-8 or, for named
/// body fields, not a JSON object.
pub fn request_param(
    action: &ActionContext,
    param: &ParamMetadata,
) -> Result<ParamValue, HttpError> {
    let request = &action.request;
    let value = match (param.kind, param.name.as_deref()) {
        (ParamKind::Body, _) => match request.text() {
            Some(Ok(text)) => ParamValue::string(text),
            Some(Err(_)) => {
                return Err(HttpError::param_normalization(
                    param.kind.label(),
                    "<invalid utf-8>",
                    "string",
                ))
            }
            None => ParamValue::Undefined,
        },
        (ParamKind::BodyParam, Some(name)) => body_field(request, name)?,
        (ParamKind::Query, Some(name)) => {
            let values = request.query_values(name);
            if param.is_array && !values.is_empty() {
                ParamValue::Json(Value::Array(
                    values.into_iter().map(|v| Value::String(v.to_string())).collect(),
                ))
            } else {
                values.first().map(|v| ParamValue::string(*v)).unwrap_or_default()
            }
        }
        (ParamKind::Queries, _) => ParamValue::object(request.query_object()),
        (ParamKind::Header, Some(name)) => request
            .get_header(name)
            .map(ParamValue::string)
            .unwrap_or_default(),
        (ParamKind::Headers, _) => ParamValue::object(request.headers_object()),
        (ParamKind::Cookie, Some(name)) => request.cookie(name).map(ParamValue::string).unwrap_or_default(),
        (ParamKind::Cookies, _) => ParamValue::object(
            request
                .cookies()
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ),
        (ParamKind::Param, Some(name)) => request
            .params
            .get(name)
            .map(|v| ParamValue::string(v.as_str()))
            .unwrap_or_default(),
        (ParamKind::Params, _) => ParamValue::object(request.params_object()),
        (ParamKind::Session, _) => request.session.clone().map(ParamValue::object).unwrap_or_default(),
        (ParamKind::SessionParam, Some(name)) => request
            .session
            .as_ref()
            .and_then(|session| session.get(name).cloned())
            .into(),
        (ParamKind::State, Some(name)) => request.state.get(name).cloned().into(),
        (ParamKind::State, None) => ParamValue::object(request.state.clone()),
        (ParamKind::Request, _) => ParamValue::Request(request.clone()),
        (ParamKind::Response, _) => ParamValue::Response(action.response.clone()),
        (ParamKind::File, Some(name)) => request
            .files
            .iter()
            .find(|file| file.field_name == name)
            .cloned()
            .map(ParamValue::File)
            .unwrap_or_default(),
        (ParamKind::Files, name) => {
            let files: Vec<_> = request
                .files
                .iter()
                .filter(|file| name.map_or(true, |n| file.field_name == n))
                .cloned()
                .collect();
            if files.is_empty() {
                ParamValue::Undefined
            } else {
                ParamValue::Files(files)
            }
        }
        _ => ParamValue::Undefined,
    };
    Ok(value)
}

/// One field of a JSON object body. A missing body or field is undefined.
fn body_field(request: &ActionRequest, name: &str) -> Result<ParamValue, HttpError> {
    let Some(body) = &request.body else {
        return Ok(ParamValue::Undefined);
    };
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut fields)) => Ok(fields.remove(name).into()),
        Ok(other) => Err(HttpError::bad_request(format!(
            "Cannot read body parameter {}: body is a JSON {}, not an object.",
            name,
            json_kind(&other)
        ))),
        Err(_) => Err(HttpError::param_normalization(
            name,
            &String::from_utf8_lossy(body),
            "object",
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Write a successful result body.
///
/// JSON controllers encode text and values as JSON. Default controllers send
/// strings as-is and serialize anything else.
pub fn write_payload(response: &mut ActionResponse, json: bool, result: ActionResult) {
    match result {
        ActionResult::Undefined | ActionResult::Null => response.end(),
        ActionResult::Bytes(bytes) => {
            response.default_content_type(BINARY_CONTENT_TYPE);
            response.send(bytes);
        }
        ActionResult::Stream(stream) => {
            response.default_content_type(BINARY_CONTENT_TYPE);
            response.send_stream(stream);
        }
        ActionResult::Text(text) if json => {
            response.default_content_type(JSON_CONTENT_TYPE);
            response.send(Value::String(text).to_string());
        }
        ActionResult::Json(value) if json => {
            response.default_content_type(JSON_CONTENT_TYPE);
            response.send(value.to_string());
        }
        ActionResult::Text(text) | ActionResult::Json(Value::String(text)) => {
            response.default_content_type(HTML_CONTENT_TYPE);
            response.send(text);
        }
        ActionResult::Json(value) => {
            response.default_content_type(HTML_CONTENT_TYPE);
            response.send(value.to_string());
        }
    }
}

/// Write an error with the built-in mapper.
pub fn write_error_payload(
    response: &mut ActionResponse,
    json: bool,
    settings: &RoutingSettings,
    mut error: HttpError,
) {
    error.apply_override(&settings.error_overriding_map);
    if error.status >= 500 {
        error!("{}: {}", error.name, error.message);
    } else {
        debug!("{}: {}", error.name, error.message);
    }

    response.set_status(error.status);
    if json {
        response.default_content_type(JSON_CONTENT_TYPE);
        response.send(error.to_json(settings.development).to_string());
    } else {
        response.default_content_type(HTML_CONTENT_TYPE);
        response.send(error.to_text(settings.development));
    }
}

/// Errors raised outside an action are written as JSON.
pub(crate) fn error_is_json(action: Option<&ActionMetadata>) -> bool {
    action.map_or(true, ActionMetadata::is_json)
}
