//! Routing configuration.

use crate::bootstrap::ClassLoader;
use crate::error::ErrorOverride;
use crate::hooks::{AuthorizationChecker, CurrentUserChecker, TemplateRenderer};
use crate::metadata::{ClassRef, Resolver, RouteSpec};
use crate::middleware::{CorsOptions, ErrorMiddleware};
use crate::params::{TransformOptions, ValidationOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default codes for `null`/`undefined` results and default parameter options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultDefaults {
    /// Status written for `null` results. 204 when unset.
    pub null_result_code: Option<u16>,
    /// Status written for `undefined` results. A 404 error when unset.
    pub undefined_result_code: Option<u16>,
    pub param_options: ParamDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamDefaults {
    /// Whether parameters are required unless they say otherwise.
    pub required: bool,
}

/// Plain-data portion of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Prefix prepended to every route. May contain `*` and `*?` segments.
    pub route_prefix: Option<String>,
    /// Expose stack traces in error responses.
    pub development: bool,
    /// Transform request values into typed instances and apply response
    /// transform options.
    pub class_transformer: bool,
    /// Validate transformed parameters.
    pub validation: bool,
    /// Write errors with the built-in mapper. When disabled, errors go to the
    /// registered error middlewares.
    pub default_error_handler: bool,
    pub defaults: ResultDefaults,
    /// Options applied to JSON results.
    pub class_to_plain: Option<TransformOptions>,
    /// Options applied to plain values before transformation.
    pub plain_to_class: Option<TransformOptions>,
    pub validation_options: ValidationOptions,
    /// Replacement message/status per error name.
    pub error_overriding_map: HashMap<String, ErrorOverride>,
    pub cors: Option<CorsOptions>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_size: 10 * 1024 * 1024, // 10MB
            route_prefix: None,
            development: development_from_env(),
            class_transformer: true,
            validation: true,
            default_error_handler: true,
            defaults: ResultDefaults::default(),
            class_to_plain: None,
            plain_to_class: None,
            validation_options: ValidationOptions::default(),
            error_overriding_map: HashMap::new(),
            cors: None,
        }
    }
}

impl RoutingSettings {
    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn development_from_env() -> bool {
    std::env::var("RUST_ENV")
        .map(|env| env != "production")
        .unwrap_or(true)
}

/// Where bootstrap finds controllers.
#[derive(Debug, Clone)]
pub enum ControllerSource {
    Class(ClassRef),
    /// Glob resolved through the configured [`ClassLoader`].
    Pattern(String),
}

impl From<ClassRef> for ControllerSource {
    fn from(class: ClassRef) -> Self {
        ControllerSource::Class(class)
    }
}

impl From<&str> for ControllerSource {
    fn from(pattern: &str) -> Self {
        ControllerSource::Pattern(pattern.to_string())
    }
}

/// Full bootstrap configuration: settings plus collaborators.
#[derive(Default)]
pub struct RoutingConfig {
    pub settings: RoutingSettings,
    /// Explicit prefix, taking precedence over `settings.route_prefix`.
    pub prefix: Option<RouteSpec>,
    pub controllers: Vec<ControllerSource>,
    /// Global middleware classes to activate.
    pub middlewares: Vec<ClassRef>,
    /// Global interceptor classes to activate.
    pub interceptors: Vec<ClassRef>,
    pub authorization_checker: Option<Arc<dyn AuthorizationChecker>>,
    pub current_user_checker: Option<Arc<dyn CurrentUserChecker>>,
    /// Instance container consulted before plain construction.
    pub container: Option<Arc<dyn Resolver>>,
    pub renderer: Option<Arc<dyn TemplateRenderer>>,
    pub loader: Option<Arc<dyn ClassLoader>>,
    pub error_middlewares: Vec<Arc<dyn ErrorMiddleware>>,
}

impl RoutingConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from deserialized settings.
    pub fn from_settings(settings: RoutingSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Set the route prefix, either a path template or a regular expression.
    pub fn route_prefix(mut self, prefix: impl Into<RouteSpec>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Include stacks in error responses and log more detail.
    pub fn development(mut self, development: bool) -> Self {
        self.settings.development = development;
        self
    }

    /// Enable transformation of class-typed parameters.
    pub fn class_transformer(mut self, enabled: bool) -> Self {
        self.settings.class_transformer = enabled;
        self
    }

    /// Validate transformed parameters unless a parameter opts out.
    pub fn validation(mut self, enabled: bool) -> Self {
        self.settings.validation = enabled;
        self
    }

    /// Write errors with the built-in handler. When disabled,
    /// errors go to the error middlewares instead.
    pub fn default_error_handler(mut self, enabled: bool) -> Self {
        self.settings.default_error_handler = enabled;
        self
    }

    /// Status written when an action returns `null`.
    pub fn null_result_code(mut self, code: u16) -> Self {
        self.settings.defaults.null_result_code = Some(code);
        self
    }

    /// Status written when an action returns `undefined`.
    pub fn undefined_result_code(mut self, code: u16) -> Self {
        self.settings.defaults.undefined_result_code = Some(code);
        self
    }

    /// Whether parameters without an explicit `required` are required.
    pub fn params_required_by_default(mut self, required: bool) -> Self {
        self.settings.defaults.param_options.required = required;
        self
    }

    /// Options applied when results are serialized.
    pub fn class_to_plain(mut self, options: TransformOptions) -> Self {
        self.settings.class_to_plain = Some(options);
        self
    }

    /// Options applied before parameters are transformed.
    pub fn plain_to_class(mut self, options: TransformOptions) -> Self {
        self.settings.plain_to_class = Some(options);
        self
    }

    /// Options passed to every validation.
    pub fn validation_options(mut self, options: ValidationOptions) -> Self {
        self.settings.validation_options = options;
        self
    }

    /// Override message and/or status for errors with the given name.
    pub fn override_error(mut self, name: impl Into<String>, with: ErrorOverride) -> Self {
        self.settings.error_overriding_map.insert(name.into(), with);
        self
    }

    /// Install the CORS middleware ahead of user middlewares.
    pub fn cors(mut self, options: CorsOptions) -> Self {
        self.settings.cors = Some(options);
        self
    }

    /// Maximum request body size in bytes. Larger bodies get 413.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.settings.max_body_size = bytes;
        self
    }

    /// Add a controller class or a glob pattern.
    pub fn controller(mut self, source: impl Into<ControllerSource>) -> Self {
        self.controllers.push(source.into());
        self
    }

    /// Activate a declared global middleware.
    pub fn middleware(mut self, class: ClassRef) -> Self {
        self.middlewares.push(class);
        self
    }

    /// Activate a declared global interceptor.
    pub fn interceptor(mut self, class: ClassRef) -> Self {
        self.interceptors.push(class);
        self
    }

    /// Checker consulted for authorized actions.
    pub fn authorization_checker(mut self, checker: impl AuthorizationChecker + 'static) -> Self {
        self.authorization_checker = Some(Arc::new(checker));
        self
    }

    /// Checker producing current-user parameters.
    pub fn current_user_checker(mut self, checker: impl CurrentUserChecker + 'static) -> Self {
        self.current_user_checker = Some(Arc::new(checker));
        self
    }

    /// Resolver tried before the built-in singletons.
    pub fn container(mut self, container: impl Resolver + 'static) -> Self {
        self.container = Some(Arc::new(container));
        self
    }

    /// Renderer used by actions with a `render` directive.
    pub fn renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Loader resolving controller glob patterns.
    pub fn loader(mut self, loader: impl ClassLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Add an error middleware. Only used when the default error
    /// handler is disabled.
    pub fn error_middleware(mut self, middleware: impl ErrorMiddleware + 'static) -> Self {
        self.error_middlewares.push(Arc::new(middleware));
        self
    }

    /// Effective route prefix.
    pub fn prefix_spec(&self) -> RouteSpec {
        match &self.prefix {
            Some(prefix) => prefix.clone(),
            None => RouteSpec::from(self.settings.route_prefix.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = RoutingSettings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:3000");
        assert!(settings.class_transformer);
        assert!(settings.default_error_handler);
        assert_eq!(settings.defaults.null_result_code, None);
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: RoutingSettings = serde_json::from_value(serde_json::json!({
            "port": 8080,
            "route_prefix": "/api",
            "development": false,
            "defaults": {"null_result_code": 404, "param_options": {"required": true}},
            "error_overriding_map": {"ForbiddenError": {"message": "nope", "status": null}}
        }))
        .unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.defaults.null_result_code, Some(404));
        assert!(settings.defaults.param_options.required);
        assert!(settings.validation);
        assert_eq!(
            settings.error_overriding_map["ForbiddenError"].message.as_deref(),
            Some("nope")
        );
    }

    #[test]
    fn test_builder_and_prefix() {
        let config = RoutingConfig::new()
            .port(9000)
            .development(false)
            .null_result_code(404);
        assert_eq!(config.settings.port, 9000);
        assert!(!config.settings.development);
        assert!(config.prefix_spec().is_none());

        let config = RoutingConfig::from_settings(RoutingSettings {
            route_prefix: Some("/api".into()),
            ..RoutingSettings::default()
        });
        assert!(matches!(config.prefix_spec(), RouteSpec::Path(ref p) if p == "/api"));
    }
}
