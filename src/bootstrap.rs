//! Bootstrap: compile declarations and install them on a driver.
//!
//! Registration order is fixed:
//!
//! 1. global interceptors (handed to the executor)
//! 2. CORS, when configured, then global before-middlewares
//! 3. controller routes, in the order controllers were supplied
//! 4. global after-middlewares
//! 5. error middlewares

use crate::config::{ControllerSource, RoutingConfig};
use crate::driver::{Driver, HyperDriver, RouteHandler, RouteRegistration, TowerDriver};
use crate::error::BootstrapError;
use crate::executor::ActionExecutor;
use crate::metadata::{
    ClassRef, FallbackResolver, MetadataBuilder, MetadataStorage, Resolver, SingletonResolver,
};
use crate::middleware::{CorsMiddleware, Middleware, MiddlewareKind};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves controller glob patterns to classes.
pub trait ClassLoader: Send + Sync {
    fn load(&self, pattern: &str) -> Result<Vec<ClassRef>, BootstrapError>;
}

/// Loader over a fixed table of `path -> class` entries.
///
/// Patterns support `*` (within one segment), `**` (any number of segments)
/// and `?` (one character).
#[derive(Debug, Clone, Default)]
pub struct StaticClassLoader {
    entries: Vec<(String, ClassRef)>,
}

impl StaticClassLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `class` under a source `path`.
    pub fn with(mut self, path: impl Into<String>, class: ClassRef) -> Self {
        self.entries.push((path.into(), class));
        self
    }
}

impl ClassLoader for StaticClassLoader {
    fn load(&self, pattern: &str) -> Result<Vec<ClassRef>, BootstrapError> {
        let matcher = glob_to_regex(pattern)?;
        Ok(self
            .entries
            .iter()
            .filter(|(path, _)| matcher.is_match(path))
            .map(|(_, class)| *class)
            .collect())
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, BootstrapError> {
    let mut source = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    source.push_str("(?:.*/)?");
                } else {
                    source.push_str(".*");
                }
            }
            '*' => source.push_str("[^/]*"),
            '?' => source.push_str("[^/]"),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| BootstrapError::Loader {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Controller classes in configuration order. Classes reachable through
/// several sources are kept every time.
fn resolve_controllers(config: &RoutingConfig) -> Result<Vec<ClassRef>, BootstrapError> {
    let mut classes = Vec::new();
    for source in &config.controllers {
        match source {
            ControllerSource::Class(class) => classes.push(*class),
            ControllerSource::Pattern(pattern) => {
                let loader = config.loader.as_ref().ok_or_else(|| BootstrapError::Loader {
                    pattern: pattern.clone(),
                    reason: "no class loader is configured".to_string(),
                })?;
                let loaded = loader.load(pattern)?;
                debug!("Pattern {} resolved {} controllers", pattern, loaded.len());
                classes.extend(loaded);
            }
        }
    }
    Ok(classes)
}

/// Compile the declarations in `storage` and install them on `driver`.
pub fn bootstrap<D: Driver>(
    storage: &MetadataStorage,
    config: RoutingConfig,
    mut driver: D,
) -> Result<D, BootstrapError> {
    let classes = resolve_controllers(&config)?;
    let prefix = config.prefix_spec();
    let RoutingConfig {
        settings,
        middlewares,
        interceptors,
        authorization_checker,
        current_user_checker,
        container,
        renderer,
        error_middlewares,
        ..
    } = config;

    let builder = MetadataBuilder::new(storage, &settings, prefix);
    let controllers = builder.build_controllers(&classes)?;
    let global_middlewares: Vec<(MiddlewareKind, Arc<dyn Middleware>)> = builder
        .build_middlewares(&middlewares)
        .into_iter()
        .map(|record| (record.kind, record.middleware.clone()))
        .collect();
    let global_interceptors = builder.build_interceptors(&interceptors);

    let singletons: Arc<dyn Resolver> = Arc::new(SingletonResolver::new());
    let resolver: Arc<dyn Resolver> = match container {
        Some(container) => Arc::new(FallbackResolver::new(container, singletons)),
        None => singletons,
    };

    let settings = Arc::new(settings);
    driver.configure(settings.clone());

    let executor = Arc::new(
        ActionExecutor::new(settings.clone(), resolver)
            .with_authorization_checker(authorization_checker)
            .with_current_user_checker(current_user_checker)
            .with_renderer(renderer)
            .with_interceptors(global_interceptors),
    );

    if let Some(cors) = &settings.cors {
        driver.register_middleware(MiddlewareKind::Before, Arc::new(CorsMiddleware::new(cors.clone())));
    }
    for (_, middleware) in global_middlewares
        .iter()
        .filter(|(kind, _)| *kind == MiddlewareKind::Before)
    {
        driver.register_middleware(MiddlewareKind::Before, middleware.clone());
    }

    let mut route_count = 0;
    for controller in &controllers {
        for action in &controller.actions {
            debug!(
                "Registering {} {} -> {}",
                action.verb,
                action.pattern.path(),
                action.id()
            );
            driver.register_route(RouteRegistration {
                verb: action.verb.clone(),
                pattern: action.pattern.clone(),
                action_id: action.id(),
                before: action.before.clone(),
                handler: RouteHandler::new(executor.clone(), action.clone()),
                after: action.after.clone(),
            });
            route_count += 1;
        }
    }

    for (_, middleware) in global_middlewares
        .iter()
        .filter(|(kind, _)| *kind == MiddlewareKind::After)
    {
        driver.register_middleware(MiddlewareKind::After, middleware.clone());
    }
    for middleware in error_middlewares {
        driver.register_error_middleware(middleware);
    }

    info!(
        "Bootstrapped {} controllers with {} routes on the {} driver",
        controllers.len(),
        route_count,
        driver.name()
    );
    Ok(driver)
}

/// Bootstrap onto a new [`HyperDriver`].
pub fn create_hyper_driver(
    storage: &MetadataStorage,
    config: RoutingConfig,
) -> Result<HyperDriver, BootstrapError> {
    bootstrap(storage, config, HyperDriver::new())
}

/// Bootstrap onto a new [`TowerDriver`].
pub fn create_tower_driver(
    storage: &MetadataStorage,
    config: RoutingConfig,
) -> Result<TowerDriver, BootstrapError> {
    bootstrap(storage, config, TowerDriver::new())
}
