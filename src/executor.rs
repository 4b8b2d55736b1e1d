//! Per-request action execution.
//!
//! ```text
//! MATCHED -> AUTHORIZING -> RESOLVING_PARAMS -> INVOKING
//!         -> TRANSFORMING_RESULT -> WRITING_RESPONSE -> COMPLETE
//!                          (any step) -> FAILED
//! ```

use crate::action::{ActionContext, ActionResult};
use crate::config::RoutingSettings;
use crate::driver::Driver;
use crate::error::HttpError;
use crate::hooks::{AuthorizationChecker, CurrentUserChecker, Interceptor, TemplateRenderer};
use crate::http::{HttpContext, HTML_CONTENT_TYPE};
use crate::metadata::{
    ActionMetadata, Instance, ParamKind, ParamMetadata, Resolver, ResultSubstitute,
};
use crate::params::{parse_json, Args, ParamType, ParamValue};
use futures_util::future::try_join_all;
use hyper::header::{CONTENT_TYPE, LOCATION};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// A response was written. `terminates` skips the after-middlewares.
    Handled { terminates: bool },
    /// The action returned nothing and declared fallthrough.
    Fallthrough,
}

/// Runs matched actions.
pub struct ActionExecutor {
    settings: Arc<RoutingSettings>,
    authorization_checker: Option<Arc<dyn AuthorizationChecker>>,
    current_user_checker: Option<Arc<dyn CurrentUserChecker>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    resolver: Arc<dyn Resolver>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ActionExecutor {
    /// Executor resolving controller instances through `resolver`.
    pub fn new(settings: Arc<RoutingSettings>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            settings,
            authorization_checker: None,
            current_user_checker: None,
            renderer: None,
            resolver,
            interceptors: Vec::new(),
        }
    }

    /// Checker consulted for authorized actions.
    pub fn with_authorization_checker(mut self, checker: Option<Arc<dyn AuthorizationChecker>>) -> Self {
        self.authorization_checker = checker;
        self
    }

    /// Checker producing current-user parameters.
    pub fn with_current_user_checker(mut self, checker: Option<Arc<dyn CurrentUserChecker>>) -> Self {
        self.current_user_checker = checker;
        self
    }

    /// Renderer for actions with a `render` directive.
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn TemplateRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Global interceptors, already ordered.
    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Execute `action` against the request in `ctx`.
    ///
    /// Errors are written through the driver unless the default error handler
    /// is disabled, in which case they are returned to the caller.
    pub async fn execute(
        &self,
        driver: &dyn Driver,
        action: &Arc<ActionMetadata>,
        ctx: &mut HttpContext,
    ) -> Result<ActionOutcome, HttpError> {
        let action_ctx = ActionContext::new(ctx.request.clone(), action.clone());

        match self.run(driver, action, &action_ctx, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                debug!("Action {} failed: {}", action.id(), err);
                if !self.settings.default_error_handler {
                    return Err(err);
                }
                if let Some(content_type) = &action.content_type {
                    ctx.response.set_header(CONTENT_TYPE.as_str(), content_type);
                }
                driver.write_error(ctx, Some(action.as_ref()), err);
                Ok(ActionOutcome::Handled { terminates: true })
            }
        }
    }

    async fn run(
        &self,
        driver: &dyn Driver,
        action: &Arc<ActionMetadata>,
        action_ctx: &ActionContext,
        ctx: &mut HttpContext,
    ) -> Result<ActionOutcome, HttpError> {
        self.authorize(action, action_ctx).await?;

        let values = try_join_all(
            action
                .params
                .iter()
                .map(|param| self.resolve_param(driver, action_ctx, param)),
        )
        .await?;
        let mut args = vec![ParamValue::Undefined; action.arg_count];
        for (param, value) in action.params.iter().zip(values) {
            args[param.index] = value;
        }

        let instance = self.instance(action)?;
        let mut result = action.handler.call(instance, Args::new(args)).await?;

        for interceptor in self.interceptors.iter().chain(action.interceptors.iter()) {
            result = interceptor.intercept(action_ctx, result).await?;
        }

        let parts = action_ctx.response.take();
        if let Some(status) = parts.status {
            ctx.response.set_status(status);
        }
        ctx.response.headers.extend(parts.headers);

        self.respond(driver, action, ctx, result).await
    }

    async fn authorize(&self, action: &ActionMetadata, action_ctx: &ActionContext) -> Result<(), HttpError> {
        let Some(roles) = &action.authorized else {
            return Ok(());
        };
        let checker = self
            .authorization_checker
            .as_ref()
            .ok_or_else(HttpError::authorization_checker_not_defined)?;

        if checker.check(action_ctx, roles).await? {
            return Ok(());
        }
        let request = &action_ctx.request;
        if roles.is_empty() {
            Err(HttpError::authorization_required(request.method.as_str(), &request.url))
        } else {
            Err(HttpError::access_denied(request.method.as_str(), &request.url))
        }
    }

    fn instance(&self, action: &ActionMetadata) -> Result<Instance, HttpError> {
        self.resolver.resolve(&action.target).ok_or_else(|| {
            HttpError::internal(format!(
                "Cannot resolve an instance of {}",
                action.target.name()
            ))
        })
    }

    async fn resolve_param(
        &self,
        driver: &dyn Driver,
        action_ctx: &ActionContext,
        param: &ParamMetadata,
    ) -> Result<ParamValue, HttpError> {
        let value = match param.kind {
            ParamKind::CurrentUser => {
                let checker = self
                    .current_user_checker
                    .as_ref()
                    .ok_or_else(HttpError::current_user_checker_not_defined)?;
                checker.current_user(action_ctx).await?
            }
            ParamKind::Custom => match &param.resolver {
                Some(resolver) => resolver.resolve(action_ctx).await?,
                None => ParamValue::Undefined,
            },
            _ => driver.param_from_request(action_ctx, param)?,
        };
        self.normalize(action_ctx, param, value)
    }

    /// Parse, coerce, check, transform and validate one raw value.
    fn normalize(
        &self,
        action_ctx: &ActionContext,
        param: &ParamMetadata,
        value: ParamValue,
    ) -> Result<ParamValue, HttpError> {
        let raw = match value {
            ParamValue::Json(raw) => raw,
            other => {
                if param.required && other.is_missing() {
                    return Err(required_error(action_ctx, param));
                }
                return Ok(other);
            }
        };

        let name = param.name.as_deref().unwrap_or(param.kind.label());
        let blank = matches!(&raw, Value::String(s) if s.is_empty());
        let mut raw = raw;
        if !blank {
            if wants_json(action_ctx, param) {
                raw = parse_json(name, raw, &param.param_type)?;
            }
            if param.kind.is_scalar_source() || param.is_array {
                raw = param.param_type.coerce(name, raw, param.is_array)?;
            }
        }

        let empty_body = param.kind == ParamKind::Body
            && matches!(&raw, Value::Object(fields) if fields.is_empty());
        let value = ParamValue::Json(raw);
        if param.required && (value.is_missing() || empty_body) {
            return Err(required_error(action_ctx, param));
        }

        let (ParamType::Class(descriptor), Some(options), ParamValue::Json(raw)) =
            (&param.param_type, &param.transform, &value)
        else {
            return Ok(value);
        };
        if !(raw.is_object() || raw.is_array()) {
            return Ok(value);
        }

        let plain = options.apply(raw.clone());
        let typed = descriptor
            .transform(plain, param.is_array)
            .map_err(|e| HttpError::bad_request(format!("Invalid {}: {}", descriptor.name(), e)))?;
        if let Some(validation) = &param.validation {
            descriptor
                .validate(&typed, param.is_array, validation)
                .map_err(|failures| HttpError::validation_failed(descriptor.name(), failures))?;
        }
        Ok(ParamValue::Typed(typed))
    }

    async fn respond(
        &self,
        driver: &dyn Driver,
        action: &ActionMetadata,
        ctx: &mut HttpContext,
        result: ActionResult,
    ) -> Result<ActionOutcome, HttpError> {
        if matches!(result, ActionResult::Undefined) && action.fallthrough {
            return Ok(ActionOutcome::Fallthrough);
        }
        let handled = ActionOutcome::Handled {
            terminates: action.terminates,
        };

        for (name, value) in &action.headers {
            ctx.response.set_header(name, value);
        }
        if let Some(content_type) = &action.content_type {
            ctx.response.set_header(CONTENT_TYPE.as_str(), content_type);
        }
        if let Some(location) = &action.location {
            ctx.response.set_header(LOCATION.as_str(), location);
        }

        if let Some(redirect) = &action.redirect {
            let target = match &result {
                ActionResult::Text(url) => url.clone(),
                _ => redirect.clone(),
            };
            let url = substitute(&target, result.as_json().as_ref(), &ctx.request.params);
            ctx.response.set_header(LOCATION.as_str(), &url);
            if ctx.response.status.is_none() {
                ctx.response.set_status(action.success_code.unwrap_or(302));
            }
            ctx.response.end();
            return Ok(handled);
        }

        if let Some(template) = &action.render {
            let renderer = self.renderer.as_ref().ok_or_else(|| {
                HttpError::internal(format!(
                    "Cannot render template {}: no template renderer is configured",
                    template
                ))
            })?;
            let data = result.as_json().unwrap_or(Value::Null);
            let html = renderer.render(template, &data).await?;
            if ctx.response.status.is_none() {
                ctx.response.set_status(action.success_code.unwrap_or(200));
            }
            ctx.response.default_content_type(HTML_CONTENT_TYPE);
            ctx.response.send(html);
            return Ok(handled);
        }

        match result {
            ActionResult::Undefined => {
                let substitute = action.undefined_result.clone().or_else(|| {
                    self.settings
                        .defaults
                        .undefined_result_code
                        .map(ResultSubstitute::Code)
                });
                match substitute {
                    Some(ResultSubstitute::Code(code)) => {
                        ctx.response.set_status(code);
                        ctx.response.end();
                    }
                    Some(ResultSubstitute::Error(make)) => return Err(make()),
                    None => return Err(HttpError::not_found("Resource was not found.")),
                }
            }
            ActionResult::Null => {
                let substitute = action.null_result.clone().unwrap_or(ResultSubstitute::Code(
                    self.settings.defaults.null_result_code.unwrap_or(204),
                ));
                match substitute {
                    ResultSubstitute::Code(code) => {
                        ctx.response.set_status(code);
                        ctx.response.end();
                    }
                    ResultSubstitute::Error(make) => return Err(make()),
                }
            }
            result => {
                if ctx.response.status.is_none() {
                    ctx.response.set_status(action.success_code.unwrap_or(200));
                }
                let result = match (result, &action.response_transform) {
                    (ActionResult::Json(value), Some(options)) => {
                        ActionResult::Json(options.apply(value))
                    }
                    (result, _) => result,
                };
                driver.write_success(ctx, action, result);
            }
        }
        Ok(handled)
    }
}

fn wants_json(action_ctx: &ActionContext, param: &ParamMetadata) -> bool {
    if param.parse || param.param_type.is_class() {
        return true;
    }
    param.kind == ParamKind::Body
        && (action_ctx.action.is_json()
            || action_ctx
                .request
                .get_header(CONTENT_TYPE.as_str())
                .is_some_and(|ct| ct.starts_with("application/json")))
}

fn required_error(action_ctx: &ActionContext, param: &ParamMetadata) -> HttpError {
    let request = &action_ctx.request;
    if param.kind == ParamKind::CurrentUser {
        return HttpError::authorization_required(request.method.as_str(), &request.url);
    }
    HttpError::param_required(
        param.kind.label(),
        param.name.as_deref(),
        request.method.as_str(),
        &request.url,
    )
}

/// Replace `:name` placeholders from the result object, then from the route
/// parameters. Unknown placeholders are kept.
fn substitute(template: &str, result: Option<&Value>, params: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let from_result = result.and_then(|r| r.get(&name)).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        match from_result.or_else(|| params.get(&name).cloned()) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                if !name.is_empty() {
                    warn!("No value for redirect placeholder :{}", name);
                }
                out.push(':');
                out.push_str(&name);
            }
        }
    }
    out
}
