//! Raw metadata records, one per declaration.

use crate::action::ActionHandler;
use crate::error::HttpError;
use crate::hooks::{CustomParamResolver, Interceptor};
use crate::metadata::ClassRef;
use crate::middleware::{Middleware, MiddlewareKind};
use crate::params::{ParamType, TransformOptions, ValidationOptions};
use crate::routing::Verb;
use regex::Regex;
use std::sync::Arc;

/// A route as declared: a path template, a regular expression, or nothing.
#[derive(Debug, Clone, Default)]
pub enum RouteSpec {
    #[default]
    None,
    Path(String),
    Regex(Regex),
}

impl RouteSpec {
    /// Whether no route was given.
    pub fn is_none(&self) -> bool {
        matches!(self, RouteSpec::None)
    }
}

impl From<&str> for RouteSpec {
    fn from(path: &str) -> Self {
        RouteSpec::Path(path.to_string())
    }
}

impl From<String> for RouteSpec {
    fn from(path: String) -> Self {
        RouteSpec::Path(path)
    }
}

impl From<Regex> for RouteSpec {
    fn from(regex: Regex) -> Self {
        RouteSpec::Regex(regex)
    }
}

impl From<Option<&str>> for RouteSpec {
    fn from(path: Option<&str>) -> Self {
        path.map(RouteSpec::from).unwrap_or_default()
    }
}

/// Serialization policy of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerKind {
    /// HTML/text responses by default.
    #[default]
    Default,
    /// JSON responses and JSON request bodies.
    Json,
}

/// Transform toggles. `None` inherits from the next level up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformToggles {
    /// Turn plain request values into typed instances.
    pub transform_request: Option<bool>,
    /// Apply response transform options to JSON results.
    pub transform_response: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ControllerRecord {
    pub target: ClassRef,
    pub route: RouteSpec,
    pub kind: ControllerKind,
    pub options: TransformToggles,
    /// Controllers whose action sets this controller includes.
    pub extends: Vec<ClassRef>,
}

#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub target: ClassRef,
    /// Identifier of the handler within its controller.
    pub method: String,
    pub verb: Verb,
    pub route: RouteSpec,
    pub handler: ActionHandler,
    pub options: TransformToggles,
}

/// Where a parameter value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Body,
    BodyParam,
    Query,
    Queries,
    Header,
    Headers,
    Cookie,
    Cookies,
    Param,
    Params,
    Session,
    SessionParam,
    State,
    Request,
    Response,
    Context,
    File,
    Files,
    CurrentUser,
    Custom,
}

impl ParamKind {
    /// Label used in "is required" messages.
    pub fn label(&self) -> &'static str {
        match self {
            ParamKind::Body => "Request body",
            ParamKind::BodyParam => "Body parameter",
            ParamKind::Query | ParamKind::Queries => "Query parameter",
            ParamKind::Header | ParamKind::Headers => "Header",
            ParamKind::Cookie | ParamKind::Cookies => "Cookie",
            ParamKind::Param | ParamKind::Params => "Route parameter",
            ParamKind::Session | ParamKind::SessionParam => "Session",
            ParamKind::State => "State",
            ParamKind::File | ParamKind::Files => "Uploaded file",
            ParamKind::CurrentUser => "Current user",
            _ => "Parameter",
        }
    }

    /// Kinds whose raw value is a string that may need coercion.
    pub fn is_scalar_source(&self) -> bool {
        matches!(
            self,
            ParamKind::Query
                | ParamKind::Header
                | ParamKind::Cookie
                | ParamKind::Param
                | ParamKind::BodyParam
                | ParamKind::SessionParam
                | ParamKind::State
        )
    }
}

/// Validation switch as declared on a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidateOption {
    Flag(bool),
    Options(ValidationOptions),
}

#[derive(Clone)]
pub struct ParamRecord {
    pub target: ClassRef,
    pub method: String,
    pub index: usize,
    pub kind: ParamKind,
    pub name: Option<String>,
    pub required: Option<bool>,
    pub parse: bool,
    pub explicit_type: Option<ParamType>,
    pub transform: Option<TransformOptions>,
    pub validate: Option<ValidateOption>,
    pub is_array: bool,
    pub resolver: Option<Arc<dyn CustomParamResolver>>,
}

impl std::fmt::Debug for ParamRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamRecord")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Replacement for a `null`/`undefined` result: a status code or an error.
#[derive(Clone)]
pub enum ResultSubstitute {
    Code(u16),
    Error(Arc<dyn Fn() -> HttpError + Send + Sync>),
}

impl ResultSubstitute {
    /// Substitute the result with the error produced by `make`.
    pub fn error<F>(make: F) -> Self
    where
        F: Fn() -> HttpError + Send + Sync + 'static,
    {
        ResultSubstitute::Error(Arc::new(make))
    }
}

impl std::fmt::Debug for ResultSubstitute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSubstitute::Code(code) => write!(f, "Code({})", code),
            ResultSubstitute::Error(_) => write!(f, "Error(..)"),
        }
    }
}

impl From<u16> for ResultSubstitute {
    fn from(code: u16) -> Self {
        ResultSubstitute::Code(code)
    }
}

/// Declarative directive shaping how an action's result is written.
#[derive(Debug, Clone)]
pub enum ResponseHandlerKind {
    Authorized(Vec<String>),
    ContentType(String),
    Header(String, String),
    Redirect(String),
    Render(String),
    HttpCode(u16),
    OnNull(ResultSubstitute),
    OnUndefined(ResultSubstitute),
    Location(String),
    Fallthrough,
    Terminates,
    ResponseTransform(TransformOptions),
}

#[derive(Debug, Clone)]
pub struct ResponseHandlerRecord {
    pub target: ClassRef,
    /// `None` applies to every action of the controller.
    pub method: Option<String>,
    pub handler: ResponseHandlerKind,
}

#[derive(Clone)]
pub struct UseRecord {
    pub target: ClassRef,
    pub method: Option<String>,
    pub middleware: Arc<dyn Middleware>,
    pub after: bool,
}

#[derive(Clone)]
pub struct InterceptorUseRecord {
    pub target: ClassRef,
    pub method: Option<String>,
    pub interceptor: Arc<dyn Interceptor>,
}

/// A middleware class available for global registration.
#[derive(Clone)]
pub struct MiddlewareRecord {
    pub target: ClassRef,
    pub middleware: Arc<dyn Middleware>,
    pub kind: MiddlewareKind,
    pub priority: i32,
}

/// An interceptor class available for global registration.
#[derive(Clone)]
pub struct InterceptorRecord {
    pub target: ClassRef,
    pub interceptor: Arc<dyn Interceptor>,
    pub priority: i32,
}
