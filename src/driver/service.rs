//! Driver exposed as a `tower::Service`.
//!
//! Layers are nested: each layer decides whether to call the next one, and
//! errors unwind back to the outermost call where they are handled once.
//! Context parameters are available only through this driver. Unmatched
//! requests get a plain-text `404 Not Found`.

use crate::action::{ActionContext, ActionResult};
use crate::config::RoutingSettings;
use crate::driver::{
    dispatch_error, error_is_json, read_request, request_param, run_chain, write_error_payload,
    write_payload, Driver, RouteEntry, RouteRegistration,
};
use crate::error::HttpError;
use crate::executor::ActionOutcome;
use crate::http::{HttpBody, HttpContext, TEXT_CONTENT_TYPE};
use crate::metadata::{ActionMetadata, ParamKind, ParamMetadata};
use crate::middleware::{ErrorMiddleware, Flow, Middleware, MiddlewareKind};
use crate::params::ParamValue;
use crate::routing::{Route, RouteSummary, RouteTable};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tower::Service;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
enum Stage {
    Before(usize),
    Routes(usize),
    After(usize),
}

/// Driver with a nested middleware chain.
#[derive(Default)]
pub struct TowerDriver {
    settings: Arc<RoutingSettings>,
    before: Vec<Arc<dyn Middleware>>,
    routes: RouteTable<RouteEntry>,
    after: Vec<Arc<dyn Middleware>>,
    error_middlewares: Vec<Arc<dyn ErrorMiddleware>>,
}

impl std::fmt::Debug for TowerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TowerDriver")
            .field("settings", &self.settings)
            .field("before", &self.before.len())
            .field("routes", &self.routes)
            .field("after", &self.after.len())
            .field("error_middlewares", &self.error_middlewares.len())
            .finish()
    }
}

impl TowerDriver {
    /// Create an unconfigured driver. Use [`crate::bootstrap`] to install routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings received at bootstrap.
    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    /// Wrap the driver into a cloneable service.
    pub fn into_service(self) -> TowerService {
        TowerService {
            driver: Arc::new(self),
        }
    }

    /// Handle one request end to end.
    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<HttpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let head_only = req.method() == Method::HEAD;
        let mut ctx = match read_request(req, self.settings.max_body_size).await {
            Ok(request) => HttpContext::new(request),
            Err(err) => {
                warn!("Failed to convert request: {}", err);
                let mut ctx = HttpContext::default();
                self.write_error(&mut ctx, None, err);
                return ctx.response.into_hyper(head_only);
            }
        };

        if let Err(err) = self.next(Stage::Before(0), &mut ctx).await {
            dispatch_error(self, &self.settings, &self.error_middlewares, &mut ctx, err).await;
        }

        if !ctx.response.written {
            ctx.response.set_status(404);
            ctx.response.set_header(CONTENT_TYPE.as_str(), TEXT_CONTENT_TYPE);
            ctx.response.send("Not Found");
        }
        ctx.response.into_hyper(head_only)
    }

    fn next<'a>(&'a self, stage: Stage, ctx: &'a mut HttpContext) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async move {
            match stage {
                Stage::Before(i) => match self.before.get(i) {
                    Some(middleware) => match middleware.handle(ctx).await? {
                        Flow::Next => self.next(Stage::Before(i + 1), ctx).await,
                        Flow::Halt => Ok(()),
                    },
                    None => self.next(Stage::Routes(0), ctx).await,
                },
                Stage::Routes(i) => {
                    let Some(route) = self.routes.get(i) else {
                        return self.next(Stage::After(0), ctx).await;
                    };
                    let Some(params) = route.matches(&ctx.request.method, &ctx.request.path) else {
                        return self.next(Stage::Routes(i + 1), ctx).await;
                    };
                    debug!("{} {} -> {}", ctx.request.method, ctx.request.path, route.action_id);
                    ctx.request_mut().params = params;

                    let entry = &route.target;
                    if !run_chain(&entry.before, ctx).await? {
                        return Ok(());
                    }
                    match entry.handler.handle(self, ctx).await? {
                        ActionOutcome::Fallthrough => self.next(Stage::Routes(i + 1), ctx).await,
                        ActionOutcome::Handled { terminates: true } => Ok(()),
                        ActionOutcome::Handled { terminates: false } => {
                            if !run_chain(&entry.after, ctx).await? {
                                return Ok(());
                            }
                            self.next(Stage::After(0), ctx).await
                        }
                    }
                }
                Stage::After(i) => match self.after.get(i) {
                    Some(middleware) => match middleware.handle(ctx).await? {
                        Flow::Next => self.next(Stage::After(i + 1), ctx).await,
                        Flow::Halt => Ok(()),
                    },
                    None => Ok(()),
                },
            }
        })
    }

    /// Start the HTTP server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.settings.bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Listening on {} with {} routes", addr, self.routes.len());

        let service = self.into_service();

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let service = TowerToHyperService::new(service.clone());

            tokio::task::spawn(async move {
                debug!("Accepted connection from {}", remote_addr);
                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

impl Driver for TowerDriver {
    fn name(&self) -> &'static str {
        "tower"
    }

    fn configure(&mut self, settings: Arc<RoutingSettings>) {
        self.settings = settings;
    }

    fn register_middleware(&mut self, kind: MiddlewareKind, middleware: Arc<dyn Middleware>) {
        match kind {
            MiddlewareKind::Before => self.before.push(middleware),
            MiddlewareKind::After => self.after.push(middleware),
        }
    }

    fn register_error_middleware(&mut self, middleware: Arc<dyn ErrorMiddleware>) {
        self.error_middlewares.push(middleware);
    }

    fn register_route(&mut self, route: RouteRegistration) {
        let entry = RouteEntry {
            before: route.before,
            handler: route.handler,
            after: route.after,
        };
        self.routes
            .add(Route::new(route.verb, route.pattern, route.action_id, entry));
    }

    fn routes(&self) -> Vec<RouteSummary> {
        self.routes.list()
    }

    fn param_from_request(
        &self,
        action: &ActionContext,
        param: &ParamMetadata,
    ) -> Result<ParamValue, HttpError> {
        match param.kind {
            ParamKind::Context => Ok(ParamValue::Context(action.clone())),
            _ => request_param(action, param),
        }
    }

    fn write_success(&self, ctx: &mut HttpContext, action: &ActionMetadata, result: ActionResult) {
        write_payload(&mut ctx.response, action.is_json(), result);
    }

    fn write_error(&self, ctx: &mut HttpContext, action: Option<&ActionMetadata>, error: HttpError) {
        write_error_payload(&mut ctx.response, error_is_json(action), &self.settings, error);
    }
}

/// `tower::Service` over a shared [`TowerDriver`].
#[derive(Clone)]
pub struct TowerService {
    driver: Arc<TowerDriver>,
}

impl TowerService {
    /// Driver behind the service.
    pub fn driver(&self) -> &TowerDriver {
        &self.driver
    }
}

impl<B> Service<Request<B>> for TowerService
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Display + Send,
{
    type Response = Response<HttpBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let driver = self.driver.clone();
        Box::pin(async move { Ok(driver.dispatch(req).await) })
    }
}
