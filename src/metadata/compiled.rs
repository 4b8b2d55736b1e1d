//! Compiled metadata: the immutable tree built once at bootstrap.

use crate::action::ActionHandler;
use crate::hooks::{CustomParamResolver, Interceptor};
use crate::metadata::records::{
    ControllerKind, ParamKind, ResultSubstitute, RouteSpec, TransformToggles,
};
use crate::metadata::ClassRef;
use crate::middleware::Middleware;
use crate::params::{ParamType, TransformOptions, ValidationOptions};
use crate::routing::{RoutePattern, Verb};
use std::sync::Arc;

/// One registered controller and its actions.
#[derive(Debug)]
pub struct ControllerMetadata {
    pub target: ClassRef,
    pub route: RouteSpec,
    pub kind: ControllerKind,
    pub options: TransformToggles,
    pub actions: Vec<Arc<ActionMetadata>>,
}

/// One executable action.
pub struct ActionMetadata {
    /// Class declaring the handler. Differs from `controller` for inherited
    /// actions.
    pub target: ClassRef,
    /// Controller the action is registered under.
    pub controller: ClassRef,
    pub controller_kind: ControllerKind,
    pub method: String,
    pub verb: Verb,
    pub route: RouteSpec,
    pub pattern: RoutePattern,
    pub handler: ActionHandler,
    /// Parameters ordered by index.
    pub params: Vec<ParamMetadata>,
    /// Number of positional arguments passed to the handler.
    pub arg_count: usize,

    /// Roles required to run the action, when it is authorized.
    pub authorized: Option<Vec<String>>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub success_code: Option<u16>,
    pub redirect: Option<String>,
    pub location: Option<String>,
    pub render: Option<String>,
    pub null_result: Option<ResultSubstitute>,
    pub undefined_result: Option<ResultSubstitute>,
    pub fallthrough: bool,
    pub terminates: bool,
    /// Options applied to JSON results, if response transformation is on.
    pub response_transform: Option<TransformOptions>,

    pub before: Vec<Arc<dyn Middleware>>,
    pub after: Vec<Arc<dyn Middleware>>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ActionMetadata {
    /// `Controller.method` identifier.
    pub fn id(&self) -> String {
        format!("{}.{}", self.controller.name(), self.method)
    }

    /// Whether the action belongs to a JSON controller.
    pub fn is_json(&self) -> bool {
        self.controller_kind == ControllerKind::Json
    }
}

impl std::fmt::Debug for ActionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMetadata")
            .field("id", &self.id())
            .field("verb", &self.verb)
            .field("path", &self.pattern.path())
            .field("params", &self.params)
            .field("authorized", &self.authorized)
            .field("fallthrough", &self.fallthrough)
            .field("terminates", &self.terminates)
            .finish_non_exhaustive()
    }
}

/// One resolved parameter slot.
#[derive(Clone)]
pub struct ParamMetadata {
    pub index: usize,
    pub kind: ParamKind,
    pub name: Option<String>,
    pub required: bool,
    pub parse: bool,
    pub param_type: ParamType,
    pub is_array: bool,
    /// Options for plain-to-typed transformation, if enabled.
    pub transform: Option<TransformOptions>,
    /// Options for validation, if enabled.
    pub validation: Option<ValidationOptions>,
    pub resolver: Option<Arc<dyn CustomParamResolver>>,
}

impl std::fmt::Debug for ParamMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamMetadata")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("required", &self.required)
            .field("type", &self.param_type)
            .finish_non_exhaustive()
    }
}
