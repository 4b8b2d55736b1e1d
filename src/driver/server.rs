//! Driver served directly on hyper's HTTP/1 connection loop.
//!
//! Layers run in one flat sequence: global before-middlewares, routes in
//! registration order, global after-middlewares. The first route whose action
//! handles the request ends route matching. Unmatched requests get
//! `404 Cannot <METHOD> <path>`.

use crate::action::{ActionContext, ActionResult};
use crate::config::RoutingSettings;
use crate::driver::{
    dispatch_error, error_is_json, read_request, request_param, run_chain, write_error_payload,
    write_payload, Driver, RouteEntry, RouteRegistration,
};
use crate::error::HttpError;
use crate::executor::ActionOutcome;
use crate::http::{HttpBody, HttpContext, HTML_CONTENT_TYPE};
use crate::metadata::{ActionMetadata, ParamMetadata};
use crate::middleware::{ErrorMiddleware, Middleware, MiddlewareKind};
use crate::params::ParamValue;
use crate::routing::{Route, RouteSummary, RouteTable};
use bytes::Bytes;
use hyper::body::{Body, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Driver with a flat middleware/route sequence.
#[derive(Default)]
pub struct HyperDriver {
    settings: Arc<RoutingSettings>,
    before: Vec<Arc<dyn Middleware>>,
    routes: RouteTable<RouteEntry>,
    after: Vec<Arc<dyn Middleware>>,
    error_middlewares: Vec<Arc<dyn ErrorMiddleware>>,
}

impl std::fmt::Debug for HyperDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperDriver")
            .field("settings", &self.settings)
            .field("before", &self.before.len())
            .field("routes", &self.routes)
            .field("after", &self.after.len())
            .field("error_middlewares", &self.error_middlewares.len())
            .finish()
    }
}

impl HyperDriver {
    /// Create an unconfigured driver. Use [`crate::bootstrap`] to install routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings received at bootstrap.
    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
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

        if let Err(err) = self.handle(&mut ctx).await {
            dispatch_error(self, &self.settings, &self.error_middlewares, &mut ctx, err).await;
        }

        if !ctx.response.written {
            let message = format!("Cannot {} {}", ctx.request.method, ctx.request.path);
            ctx.response.set_status(404);
            ctx.response.set_header(CONTENT_TYPE.as_str(), HTML_CONTENT_TYPE);
            ctx.response.send(message);
        }
        ctx.response.into_hyper(head_only)
    }

    async fn handle(&self, ctx: &mut HttpContext) -> Result<(), HttpError> {
        if !run_chain(&self.before, ctx).await? {
            return Ok(());
        }

        let method = ctx.request.method.clone();
        let path = ctx.request.path.clone();
        for route in self.routes.iter() {
            let Some(params) = route.matches(&method, &path) else {
                continue;
            };
            debug!("{} {} -> {}", method, path, route.action_id);
            ctx.request_mut().params = params;

            let entry = &route.target;
            if !run_chain(&entry.before, ctx).await? {
                return Ok(());
            }
            match entry.handler.handle(self, ctx).await? {
                ActionOutcome::Fallthrough => continue,
                ActionOutcome::Handled { terminates: true } => return Ok(()),
                ActionOutcome::Handled { terminates: false } => {
                    if !run_chain(&entry.after, ctx).await? {
                        return Ok(());
                    }
                    break;
                }
            }
        }

        run_chain(&self.after, ctx).await?;
        Ok(())
    }

    /// Start the HTTP server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.settings.bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Listening on {} with {} routes", addr, self.routes.len());

        let driver = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);

            let driver = driver.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let driver = driver.clone();
                    async move {
                        debug!("Handling request: {} {} from {}", req.method(), req.uri(), remote_addr);
                        Ok::<_, Infallible>(driver.dispatch(req).await)
                    }
                });

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

impl Driver for HyperDriver {
    fn name(&self) -> &'static str {
        "hyper"
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
        request_param(action, param)
    }

    fn write_success(&self, ctx: &mut HttpContext, action: &ActionMetadata, result: ActionResult) {
        write_payload(&mut ctx.response, action.is_json(), result);
    }

    fn write_error(&self, ctx: &mut HttpContext, action: Option<&ActionMetadata>, error: HttpError) {
        write_error_payload(&mut ctx.response, error_is_json(action), &self.settings, error);
    }
}
