//! Fluent declaration API.
//!
//! Application code describes its controllers with these builders and calls
//! `register` to push the raw records into a [`MetadataStorage`]:
//!
//! ```rust,ignore
//! ControllerDecl::json::<UsersController>("/users")
//!     .action(
//!         ActionDecl::get("one", "/:id", handler(UsersController::one))
//!             .param(0, ParamDecl::param("id").typed(ParamType::Number))
//!             .on_undefined(404),
//!     )
//!     .register(&mut storage);
//! ```

use crate::action::ActionHandler;
use crate::hooks::{CustomParamResolver, Interceptor};
use crate::metadata::{
    ActionRecord, ClassRef, ControllerKind, ControllerRecord, InterceptorRecord,
    InterceptorUseRecord, MetadataStorage, MiddlewareRecord, ParamKind, ParamRecord,
    ResponseHandlerKind, ResponseHandlerRecord, ResultSubstitute, RouteSpec, TransformToggles,
    UseRecord, ValidateOption,
};
use crate::middleware::{Middleware, MiddlewareKind};
use crate::params::{ParamType, TransformOptions, TypeDescriptor, Validate, ValidationOptions};
use crate::routing::Verb;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Response-handler directives shared by controllers and actions.
pub trait Responds: Sized {
    fn respond(self, handler: ResponseHandlerKind) -> Self;

    /// Require authorization. An empty role list accepts any principal.
    fn authorized<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.respond(ResponseHandlerKind::Authorized(
            roles.into_iter().map(Into::into).collect(),
        ))
    }

    fn content_type(self, value: impl Into<String>) -> Self {
        self.respond(ResponseHandlerKind::ContentType(value.into()))
    }

    fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.respond(ResponseHandlerKind::Header(name.into(), value.into()))
    }

    /// Status used for successful results.
    fn http_code(self, code: u16) -> Self {
        self.respond(ResponseHandlerKind::HttpCode(code))
    }

    fn location(self, url: impl Into<String>) -> Self {
        self.respond(ResponseHandlerKind::Location(url.into()))
    }

    /// Redirect to `url`. `:name` segments are filled from the result or the
    /// route parameters.
    fn redirect(self, url: impl Into<String>) -> Self {
        self.respond(ResponseHandlerKind::Redirect(url.into()))
    }

    fn render(self, template: impl Into<String>) -> Self {
        self.respond(ResponseHandlerKind::Render(template.into()))
    }

    fn on_null(self, substitute: impl Into<ResultSubstitute>) -> Self {
        self.respond(ResponseHandlerKind::OnNull(substitute.into()))
    }

    fn on_undefined(self, substitute: impl Into<ResultSubstitute>) -> Self {
        self.respond(ResponseHandlerKind::OnUndefined(substitute.into()))
    }

    /// Hand `undefined` results to the next matching route or middleware.
    fn fallthrough(self) -> Self {
        self.respond(ResponseHandlerKind::Fallthrough)
    }

    /// Skip after-middlewares once the action has responded.
    fn terminates(self) -> Self {
        self.respond(ResponseHandlerKind::Terminates)
    }

    fn response_transform(self, options: TransformOptions) -> Self {
        self.respond(ResponseHandlerKind::ResponseTransform(options))
    }
}

#[derive(Default)]
struct Attachments {
    handlers: Vec<ResponseHandlerKind>,
    uses: Vec<(Arc<dyn Middleware>, bool)>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Attachments {
    fn register(self, storage: &mut MetadataStorage, target: ClassRef, method: Option<&str>) {
        for handler in self.handlers {
            storage.push_response_handler(ResponseHandlerRecord {
                target,
                method: method.map(str::to_string),
                handler,
            });
        }
        for (middleware, after) in self.uses {
            storage.push_use(UseRecord {
                target,
                method: method.map(str::to_string),
                middleware,
                after,
            });
        }
        for interceptor in self.interceptors {
            storage.push_interceptor_use(InterceptorUseRecord {
                target,
                method: method.map(str::to_string),
                interceptor,
            });
        }
    }
}

/// Declaration of a controller class and its actions.
pub struct ControllerDecl {
    target: ClassRef,
    record: Option<(RouteSpec, ControllerKind)>,
    options: TransformToggles,
    extends: Vec<ClassRef>,
    attachments: Attachments,
    actions: Vec<ActionDecl>,
}

impl ControllerDecl {
    /// A controller serializing results as JSON.
    pub fn json<T: Default + Send + Sync + 'static>(route: impl Into<RouteSpec>) -> Self {
        Self::new(ClassRef::of::<T>(), route, ControllerKind::Json)
    }

    /// A controller writing results as HTML/text.
    pub fn default<T: Default + Send + Sync + 'static>(route: impl Into<RouteSpec>) -> Self {
        Self::new(ClassRef::of::<T>(), route, ControllerKind::Default)
    }

    /// A controller for an arbitrary class reference.
    pub fn new(target: ClassRef, route: impl Into<RouteSpec>, kind: ControllerKind) -> Self {
        Self {
            target,
            record: Some((route.into(), kind)),
            options: TransformToggles::default(),
            extends: Vec::new(),
            attachments: Attachments::default(),
            actions: Vec::new(),
        }
    }

    /// Actions of a class that is not itself a controller. Such a class is
    /// typically included by other controllers through [`extends`](Self::extends).
    pub fn base(target: ClassRef) -> Self {
        Self {
            record: None,
            ..Self::new(target, RouteSpec::None, ControllerKind::Default)
        }
    }

    /// Include every action declared on `base`.
    pub fn extends(mut self, base: ClassRef) -> Self {
        self.extends.push(base);
        self
    }

    /// Toggle parameter transformation for every action of the controller.
    pub fn transform_request(mut self, enabled: bool) -> Self {
        self.options.transform_request = Some(enabled);
        self
    }

    /// Toggle result transformation for every action of the controller.
    pub fn transform_response(mut self, enabled: bool) -> Self {
        self.options.transform_response = Some(enabled);
        self
    }

    /// Add an action.
    pub fn action(mut self, action: ActionDecl) -> Self {
        self.actions.push(action);
        self
    }

    /// Run `middleware` before every action of the controller.
    pub fn use_before(mut self, middleware: impl Middleware + 'static) -> Self {
        self.attachments.uses.push((Arc::new(middleware), false));
        self
    }

    /// Run `middleware` after every action of the controller.
    pub fn use_after(mut self, middleware: impl Middleware + 'static) -> Self {
        self.attachments.uses.push((Arc::new(middleware), true));
        self
    }

    /// Apply `interceptor` to every action of the controller.
    pub fn use_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.attachments.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Push every record of this declaration.
    pub fn register(self, storage: &mut MetadataStorage) {
        let target = self.target;
        if let Some((route, kind)) = self.record {
            storage.push_controller(ControllerRecord {
                target,
                route,
                kind,
                options: self.options,
                extends: self.extends,
            });
        }
        self.attachments.register(storage, target, None);
        for action in self.actions {
            action.register(storage, target);
        }
    }
}

impl Responds for ControllerDecl {
    fn respond(mut self, handler: ResponseHandlerKind) -> Self {
        self.attachments.handlers.push(handler);
        self
    }
}

/// Declaration of one action.
pub struct ActionDecl {
    method: String,
    verb: Verb,
    route: RouteSpec,
    handler: ActionHandler,
    options: TransformToggles,
    params: Vec<(usize, ParamDecl)>,
    attachments: Attachments,
}

impl ActionDecl {
    /// An action answering `verb`. `method` names the handler within its
    /// controller.
    pub fn new(
        verb: Verb,
        method: impl Into<String>,
        route: impl Into<RouteSpec>,
        handler: ActionHandler,
    ) -> Self {
        Self {
            method: method.into(),
            verb,
            route: route.into(),
            handler,
            options: TransformToggles::default(),
            params: Vec::new(),
            attachments: Attachments::default(),
        }
    }

    /// Action answering `GET` (and `HEAD`).
    pub fn get(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::get(), method, route, handler)
    }

    /// Action answering `POST`.
    pub fn post(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::post(), method, route, handler)
    }

    /// Action answering `PUT`.
    pub fn put(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::put(), method, route, handler)
    }

    /// Action answering `PATCH`.
    pub fn patch(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::patch(), method, route, handler)
    }

    /// Action answering `DELETE`.
    pub fn delete(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::delete(), method, route, handler)
    }

    /// Action answering `HEAD`.
    pub fn head(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::head(), method, route, handler)
    }

    /// Action answering every method.
    pub fn all(method: impl Into<String>, route: impl Into<RouteSpec>, handler: ActionHandler) -> Self {
        Self::new(Verb::All, method, route, handler)
    }

    /// Declare the parameter at position `index`.
    pub fn param(mut self, index: usize, param: ParamDecl) -> Self {
        self.params.push((index, param));
        self
    }

    /// Toggle parameter transformation for this action.
    pub fn transform_request(mut self, enabled: bool) -> Self {
        self.options.transform_request = Some(enabled);
        self
    }

    /// Toggle result transformation for this action.
    pub fn transform_response(mut self, enabled: bool) -> Self {
        self.options.transform_response = Some(enabled);
        self
    }

    /// Run `middleware` before this action.
    pub fn use_before(mut self, middleware: impl Middleware + 'static) -> Self {
        self.attachments.uses.push((Arc::new(middleware), false));
        self
    }

    /// Run `middleware` after this action.
    pub fn use_after(mut self, middleware: impl Middleware + 'static) -> Self {
        self.attachments.uses.push((Arc::new(middleware), true));
        self
    }

    /// Apply `interceptor` to this action.
    pub fn use_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.attachments.interceptors.push(Arc::new(interceptor));
        self
    }

    fn register(self, storage: &mut MetadataStorage, target: ClassRef) {
        storage.push_action(ActionRecord {
            target,
            method: self.method.clone(),
            verb: self.verb,
            route: self.route,
            handler: self.handler,
            options: self.options,
        });
        for (index, param) in self.params {
            param.register(storage, target, &self.method, index);
        }
        self.attachments.register(storage, target, Some(&self.method));
    }
}

impl Responds for ActionDecl {
    fn respond(mut self, handler: ResponseHandlerKind) -> Self {
        self.attachments.handlers.push(handler);
        self
    }
}

/// Declaration of one action parameter.
#[derive(Clone)]
pub struct ParamDecl {
    kind: ParamKind,
    name: Option<String>,
    required: Option<bool>,
    parse: bool,
    explicit_type: Option<ParamType>,
    transform: Option<TransformOptions>,
    validate: Option<ValidateOption>,
    is_array: bool,
    resolver: Option<Arc<dyn CustomParamResolver>>,
}

impl ParamDecl {
    fn of(kind: ParamKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            required: None,
            parse: false,
            explicit_type: None,
            transform: None,
            validate: None,
            is_array: false,
            resolver: None,
        }
    }

    fn named(kind: ParamKind, name: impl Into<String>) -> Self {
        Self::of(kind, Some(name.into()))
    }

    /// The whole request body.
    pub fn body() -> Self {
        Self::of(ParamKind::Body, None)
    }

    /// One field of a JSON object body.
    pub fn body_param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::BodyParam, name)
    }

    /// One query string value.
    pub fn query(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Query, name)
    }

    /// The whole query string as an object.
    pub fn queries() -> Self {
        Self::of(ParamKind::Queries, None)
    }

    /// One request header, matched case-insensitively.
    pub fn header(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Header, name)
    }

    /// All request headers as an object.
    pub fn headers() -> Self {
        Self::of(ParamKind::Headers, None)
    }

    /// One cookie.
    pub fn cookie(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Cookie, name)
    }

    /// All cookies as an object.
    pub fn cookies() -> Self {
        Self::of(ParamKind::Cookies, None)
    }

    /// A route parameter.
    pub fn param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Param, name)
    }

    /// All route parameters as an object.
    pub fn params() -> Self {
        Self::of(ParamKind::Params, None)
    }

    /// The whole session object.
    pub fn session() -> Self {
        Self::of(ParamKind::Session, None)
    }

    /// One session value.
    pub fn session_param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::SessionParam, name)
    }

    /// One request state value.
    pub fn state(name: impl Into<String>) -> Self {
        Self::named(ParamKind::State, name)
    }

    /// The whole request state object.
    pub fn state_object() -> Self {
        Self::of(ParamKind::State, None)
    }

    /// The request itself.
    pub fn request() -> Self {
        Self::of(ParamKind::Request, None)
    }

    /// Handle for setting the response status and headers.
    pub fn response() -> Self {
        Self::of(ParamKind::Response, None)
    }

    /// The action context. Only injected by the tower driver.
    pub fn context() -> Self {
        Self::of(ParamKind::Context, None)
    }

    /// One uploaded file.
    pub fn file(name: impl Into<String>) -> Self {
        Self::named(ParamKind::File, name)
    }

    /// All uploaded files of a field.
    pub fn files(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Files, name)
    }

    /// The current user, from the current-user checker.
    pub fn current_user() -> Self {
        Self::of(ParamKind::CurrentUser, None)
    }

    /// A parameter produced by `resolver`.
    pub fn custom(resolver: impl CustomParamResolver + 'static) -> Self {
        Self {
            resolver: Some(Arc::new(resolver)),
            ..Self::of(ParamKind::Custom, None)
        }
    }

    /// Reject requests where the value is missing.
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Parse the raw value as JSON.
    pub fn parse(mut self, parse: bool) -> Self {
        self.parse = parse;
        self
    }

    /// Coerce the raw value to `param_type`.
    pub fn typed(mut self, param_type: ParamType) -> Self {
        self.explicit_type = Some(param_type);
        self
    }

    /// Shorthand for a class type built through serde.
    pub fn class<T: DeserializeOwned + Send + Sync + 'static>(self) -> Self {
        self.typed(ParamType::Class(TypeDescriptor::of::<T>()))
    }

    /// Class type that validates itself after transformation.
    pub fn validated_class<T: DeserializeOwned + Validate + Send + Sync + 'static>(self) -> Self {
        self.typed(ParamType::Class(TypeDescriptor::validated::<T>()))
    }

    /// Options applied before class transformation.
    pub fn transform(mut self, options: TransformOptions) -> Self {
        self.transform = Some(options);
        self
    }

    /// Enable or disable validation for this parameter.
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = Some(ValidateOption::Flag(enabled));
        self
    }

    /// Validate with `options`.
    pub fn validate_with(mut self, options: ValidationOptions) -> Self {
        self.validate = Some(ValidateOption::Options(options));
        self
    }

    /// Collect every value of the key into an array.
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Push this parameter for `target.method` at `index`.
    pub fn register(self, storage: &mut MetadataStorage, target: ClassRef, method: &str, index: usize) {
        storage.push_param(ParamRecord {
            target,
            method: method.to_string(),
            index,
            kind: self.kind,
            name: self.name,
            required: self.required,
            parse: self.parse,
            explicit_type: self.explicit_type,
            transform: self.transform,
            validate: self.validate,
            is_array: self.is_array,
            resolver: self.resolver,
        });
    }
}

/// Declaration of a middleware available for global registration.
pub struct MiddlewareDecl {
    target: ClassRef,
    middleware: Arc<dyn Middleware>,
    kind: MiddlewareKind,
    priority: i32,
}

impl MiddlewareDecl {
    /// Global middleware running before the routes.
    pub fn before<T: Middleware + 'static>(middleware: T) -> Self {
        Self::new(middleware, MiddlewareKind::Before)
    }

    /// Global middleware running after the routes.
    pub fn after<T: Middleware + 'static>(middleware: T) -> Self {
        Self::new(middleware, MiddlewareKind::After)
    }

    fn new<T: Middleware + 'static>(middleware: T, kind: MiddlewareKind) -> Self {
        Self {
            target: ClassRef::external::<T>(),
            middleware: Arc::new(middleware),
            kind,
            priority: 0,
        }
    }

    /// Lower priorities run first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Push the declaration into `storage`.
    pub fn register(self, storage: &mut MetadataStorage) {
        storage.push_middleware(MiddlewareRecord {
            target: self.target,
            middleware: self.middleware,
            kind: self.kind,
            priority: self.priority,
        });
    }
}

/// Declaration of an interceptor available for global registration.
pub struct InterceptorDecl {
    target: ClassRef,
    interceptor: Arc<dyn Interceptor>,
    priority: i32,
}

impl InterceptorDecl {
    /// Global interceptor.
    pub fn new<T: Interceptor + 'static>(interceptor: T) -> Self {
        Self {
            target: ClassRef::external::<T>(),
            interceptor: Arc::new(interceptor),
            priority: 0,
        }
    }

    /// Lower priorities run first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Push the declaration into `storage`.
    pub fn register(self, storage: &mut MetadataStorage) {
        storage.push_interceptor(InterceptorRecord {
            target: self.target,
            interceptor: self.interceptor,
            priority: self.priority,
        });
    }
}
