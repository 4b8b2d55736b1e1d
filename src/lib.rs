//! # actionroute - controller/action routing over hyper and tower
//!
//! actionroute turns explicitly declared controllers, actions and parameters
//! into HTTP routes. Declarations are recorded in a [`MetadataStorage`],
//! compiled once at bootstrap and installed on a driver that serves them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │            Declarations (ControllerDecl / ActionDecl / ...)         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │ register
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         MetadataStorage                             │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │ bootstrap (MetadataBuilder)
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Driver                                   │
//! │  ┌────────────┐   ┌──────────────────────────────┐   ┌────────────┐ │
//! │  │   before   │ → │ routes → ActionExecutor      │ → │   after    │ │
//! │  │ middleware │   │ (auth, params, handler,      │   │ middleware │ │
//! │  └────────────┘   │  interceptors, response)     │   └────────────┘ │
//! │                   └──────────────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actionroute::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct UsersController;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut storage = MetadataStorage::new();
//!
//!     ControllerDecl::json::<UsersController>("/users")
//!         .action(
//!             ActionDecl::get(
//!                 "one",
//!                 "/:id",
//!                 handler(|_: Arc<UsersController>, args: Args| async move {
//!                     let id = args.i64(0).unwrap_or_default();
//!                     ActionResult::json(&serde_json::json!({ "id": id }))
//!                 }),
//!             )
//!             .param(0, ParamDecl::param("id").typed(ParamType::Number)),
//!         )
//!         .register(&mut storage);
//!
//!     let config = RoutingConfig::new()
//!         .port(3000)
//!         .route_prefix("/api")
//!         .controller(ClassRef::of::<UsersController>());
//!
//!     // GET /api/users/7 -> {"id":7}
//!     create_hyper_driver(&storage, config)?.run().await
//! }
//! ```
//!
//! ## Drivers
//!
//! - [`HyperDriver`] runs layers as a flat sequence on hyper's HTTP/1 server.
//! - [`TowerDriver`] nests layers and is exposed as a `tower::Service`.
//!
//! Both match routes first-registered-first and map results and errors the
//! same way.

pub mod action;
pub mod bootstrap;
pub mod config;
pub mod declare;
pub mod driver;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod http;
pub mod metadata;
pub mod middleware;
pub mod params;
pub mod routing;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::action::{handler, ActionContext, ActionResult, ResponseHandle};
    pub use crate::bootstrap::{bootstrap, create_hyper_driver, create_tower_driver, StaticClassLoader};
    pub use crate::config::{RoutingConfig, RoutingSettings};
    pub use crate::declare::{
        ActionDecl, ControllerDecl, InterceptorDecl, MiddlewareDecl, ParamDecl, Responds,
    };
    pub use crate::driver::{Driver, HyperDriver, TowerDriver, TowerService};
    pub use crate::error::{ErrorOverride, HttpError, ValidationFailure};
    pub use crate::hooks::{
        AuthorizationChecker, CurrentUserChecker, CustomParamResolver, Interceptor,
        TemplateRenderer,
    };
    pub use crate::http::{HttpContext, Method, StatusCode};
    pub use crate::metadata::{ClassRef, Container, MetadataStorage};
    pub use crate::middleware::{CorsOptions, ErrorMiddleware, Flow, Middleware};
    pub use crate::params::{
        Args, ParamType, ParamValue, TransformOptions, TypeDescriptor, Validate,
        ValidationOptions,
    };
    pub use crate::routing::Verb;
    pub use async_trait::async_trait;
}

// Re-export for convenience
pub use action::{handler, ActionContext, ActionResult};
pub use bootstrap::{bootstrap, create_hyper_driver, create_tower_driver};
pub use config::{RoutingConfig, RoutingSettings};
pub use driver::{Driver, HyperDriver, TowerDriver};
pub use error::{BootstrapError, HttpError};
pub use metadata::{ClassRef, MetadataStorage};
