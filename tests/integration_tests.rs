//! Integration tests running the same scenarios against both drivers.

use actionroute::prelude::*;
use actionroute::BootstrapError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct App {
    hyper: HyperDriver,
    tower: TowerService,
}

impl App {
    fn new(storage: &MetadataStorage, config: impl Fn() -> RoutingConfig) -> Self {
        Self {
            hyper: create_hyper_driver(storage, config()).unwrap(),
            tower: create_tower_driver(storage, config()).unwrap().into_service(),
        }
    }

    /// Send the request to both drivers: `[hyper, tower]`.
    async fn send(&self, make: impl Fn() -> Request<Full<Bytes>>) -> [Reply; 2] {
        let from_hyper = Reply::read(self.hyper.dispatch(make()).await).await;
        let from_tower = Reply::read(self.tower.clone().oneshot(make()).await.unwrap()).await;
        [from_hyper, from_tower]
    }
}

#[derive(Debug)]
struct Reply {
    status: u16,
    headers: hyper::HeaderMap,
    body: String,
}

impl Reply {
    async fn read(response: Response<actionroute::http::HttpBody>) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        Self {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::builder().uri(uri).body(Full::new(Bytes::new())).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn quiet() -> RoutingConfig {
    RoutingConfig::new().development(false)
}

#[derive(Default)]
struct UsersController;

#[derive(Default)]
struct PagesController;

#[tokio::test]
async fn test_json_controller_list() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(ActionDecl::get(
            "get_all",
            "/users",
            handler(|_: Arc<UsersController>, _| async {
                ActionResult::json(&json!([{"id": 1, "name": "Timber Saw"}]))
            }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/users")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(reply.json(), json!([{"id": 1, "name": "Timber Saw"}]));
    }
}

#[tokio::test]
async fn test_thrown_not_found_error() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/videos")
        .action(ActionDecl::get(
            "list",
            "/",
            handler(|_: Arc<UsersController>, _| async {
                Err(HttpError::not_found("Videos were not found."))
            }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/videos")).await {
        assert_eq!(reply.status, 404);
        assert_eq!(
            reply.json(),
            json!({"name": "NotFoundError", "message": "Videos were not found."})
        );
    }
}

#[tokio::test]
async fn test_authorization_denied() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::get(
                "admin",
                "/admin",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::text("ok")) }),
            )
            .authorized(["role1"]),
        )
        .action(
            ActionDecl::get(
                "me",
                "/me",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::text("ok")) }),
            )
            .authorized(Vec::<String>::new()),
        )
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .controller(ClassRef::of::<UsersController>())
            .authorization_checker(|_: &ActionContext, _: &[String]| Ok::<_, HttpError>(false))
    });
    for reply in app.send(|| get("/admin")).await {
        assert_eq!(reply.status, 403);
    }
    for reply in app.send(|| get("/me")).await {
        assert_eq!(reply.status, 401);
    }
}

#[tokio::test]
async fn test_authorized_without_checker_fails_closed() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .authorized(Vec::<String>::new())
        .action(ActionDecl::get(
            "me",
            "/me",
            handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::text("ok")) }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/me")).await {
        assert_eq!(reply.status, 500);
        assert_eq!(reply.json()["name"], "AuthorizationCheckerNotDefinedError");
    }
}

#[tokio::test]
async fn test_null_result_codes() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(ActionDecl::get(
            "nothing",
            "/nothing",
            handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::Null) }),
        ))
        .action(
            ActionDecl::get(
                "gone",
                "/gone",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::Null) }),
            )
            .on_null(410),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/nothing")).await {
        assert_eq!(reply.status, 204);
        assert!(reply.body.is_empty());
    }

    let app = App::new(&storage, || {
        quiet()
            .null_result_code(404)
            .controller(ClassRef::of::<PagesController>())
    });
    for reply in app.send(|| get("/nothing")).await {
        assert_eq!(reply.status, 404);
    }
    for reply in app.send(|| get("/gone")).await {
        assert_eq!(reply.status, 410);
    }
}

#[tokio::test]
async fn test_undefined_result_is_not_found() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/users")
        .action(ActionDecl::get(
            "one",
            "/:id",
            handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Undefined) }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/users/1")).await {
        assert_eq!(reply.status, 404);
        assert_eq!(reply.json()["name"], "NotFoundError");
    }

    let app = App::new(&storage, || {
        quiet()
            .undefined_result_code(204)
            .controller(ClassRef::of::<UsersController>())
    });
    for reply in app.send(|| get("/users/1")).await {
        assert_eq!(reply.status, 204);
    }
}

#[derive(Default)]
struct FirstController;

#[derive(Default)]
struct SecondController;

#[tokio::test]
async fn test_first_registered_route_wins() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<FirstController>("")
        .action(ActionDecl::get(
            "any",
            "/*",
            handler(|_: Arc<FirstController>, _| async { Ok(ActionResult::text("first")) }),
        ))
        .register(&mut storage);
    ControllerDecl::default::<SecondController>("")
        .action(ActionDecl::get(
            "second",
            "/second/*",
            handler(|_: Arc<SecondController>, _| async { Ok(ActionResult::text("second")) }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .controller(ClassRef::of::<FirstController>())
            .controller(ClassRef::of::<SecondController>())
    });
    for reply in app.send(|| get("/second/first/any")).await {
        assert_eq!(reply.body, "first");
    }

    let app = App::new(&storage, || {
        quiet()
            .controller(ClassRef::of::<SecondController>())
            .controller(ClassRef::of::<FirstController>())
    });
    for reply in app.send(|| get("/second/first/any")).await {
        assert_eq!(reply.body, "second");
    }
}

#[tokio::test]
async fn test_wildcard_prefix() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/users")
        .action(ActionDecl::get(
            "list",
            "/",
            handler(|_: Arc<UsersController>, _| async { ActionResult::json(&json!([])) }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .route_prefix("/*/api")
            .controller(ClassRef::of::<UsersController>())
    });
    for uri in ["/dev/api/users", "/prod/api/users"] {
        for reply in app.send(|| get(uri)).await {
            assert_eq!(reply.status, 200, "{}", uri);
        }
    }
    for reply in app.send(|| get("/api/users")).await {
        assert_eq!(reply.status, 404);
    }
}

#[tokio::test]
async fn test_required_params_accept_falsy_values() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::get(
                "count",
                "/count",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(json!({
                        "n": args.value(0).cloned(),
                        "flag": args.bool(1),
                    })))
                }),
            )
            .param(0, ParamDecl::query("n").typed(ParamType::Number).required(true))
            .param(1, ParamDecl::query("flag").typed(ParamType::Boolean)),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/count?n=0&flag=false")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({"n": 0, "flag": false}));
    }
    for reply in app.send(|| get("/count")).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "ParamRequiredError");
    }
    for reply in app.send(|| get("/count?n=abc")).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "ParamNormalizationError");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInput {
    first_name: String,
    last_name: String,
}

impl Validate for UserInput {
    fn validate(&self, _: &ValidationOptions) -> Result<(), Vec<ValidationFailure>> {
        if self.first_name.is_empty() {
            return Err(vec![ValidationFailure::new(
                "firstName",
                "isNotEmpty",
                "firstName should not be empty",
            )]);
        }
        Ok(())
    }
}

fn declare_user_input(storage: &mut MetadataStorage) {
    ControllerDecl::json::<UsersController>("/users")
        .action(
            ActionDecl::post(
                "create",
                "/",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    let result = match args.typed::<UserInput>(0) {
                        Some(user) => json!({"typed": true, "name": format!("{} {}", user.first_name, user.last_name)}),
                        None => json!({"typed": false, "plain": args.value(0).cloned()}),
                    };
                    Ok(ActionResult::Json(result))
                }),
            )
            .param(0, ParamDecl::body().validated_class::<UserInput>()),
        )
        .register(storage);
}

#[tokio::test]
async fn test_body_transformed_into_class() {
    let mut storage = MetadataStorage::new();
    declare_user_input(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    let body = json!({"firstName": "Umed", "lastName": "Khudoiberdiev"});
    for reply in app.send(|| post_json("/users", body.clone())).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({"typed": true, "name": "Umed Khudoiberdiev"}));
    }

    let app = App::new(&storage, || {
        quiet()
            .class_transformer(false)
            .controller(ClassRef::of::<UsersController>())
    });
    for reply in app.send(|| post_json("/users", body.clone())).await {
        assert_eq!(reply.json(), json!({"typed": false, "plain": body}));
    }
}

#[tokio::test]
async fn test_validation_failure_is_bad_request() {
    let mut storage = MetadataStorage::new();
    declare_user_input(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app
        .send(|| post_json("/users", json!({"firstName": "", "lastName": "x"})))
        .await
    {
        assert_eq!(reply.status, 400);
        let body = reply.json();
        assert_eq!(body["name"], "BadRequestError");
        assert_eq!(body["errors"][0]["property"], "firstName");
    }
}

#[tokio::test]
async fn test_reset_then_reregister_yields_same_routes() {
    fn declare(storage: &mut MetadataStorage) {
        ControllerDecl::json::<UsersController>("/users")
            .action(ActionDecl::get(
                "list",
                "/",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Null) }),
            ))
            .action(ActionDecl::post(
                "create",
                "/",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Null) }),
            ))
            .register(storage);
    }
    let config = || RoutingConfig::new().controller(ClassRef::of::<UsersController>());

    let mut storage = MetadataStorage::new();
    declare(&mut storage);
    let first = create_hyper_driver(&storage, config()).unwrap().routes();

    storage.reset();
    assert!(storage.is_empty());
    declare(&mut storage);
    let second = create_hyper_driver(&storage, config()).unwrap().routes();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn test_cors_preflight() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/users")
        .action(ActionDecl::get(
            "list",
            "/",
            handler(|_: Arc<UsersController>, _| async { ActionResult::json(&json!([])) }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .cors(CorsOptions::default().max_age(600))
            .controller(ClassRef::of::<UsersController>())
    });
    let preflight = || {
        Request::builder()
            .method("OPTIONS")
            .uri("/users")
            .header("origin", "http://example.com")
            .header("access-control-request-headers", "x-token")
            .body(Full::new(Bytes::new()))
            .unwrap()
    };
    for reply in app.send(preflight).await {
        assert_eq!(reply.status, 204);
        assert_eq!(reply.header("access-control-allow-origin"), Some("*"));
        assert_eq!(reply.header("access-control-allow-headers"), Some("x-token"));
        assert_eq!(reply.header("access-control-max-age"), Some("600"));
    }
    for reply in app.send(|| get("/users")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("access-control-allow-origin"), Some("*"));
    }
}

#[tokio::test]
async fn test_error_middleware_when_default_handler_disabled() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(ActionDecl::get(
            "fail",
            "/fail",
            handler(|_: Arc<UsersController>, _| async {
                Err(HttpError::forbidden("no entry").with_property("secret", json!("s3cr3t")))
            }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .default_error_handler(false)
            .controller(ClassRef::of::<UsersController>())
            .error_middleware(|err: &HttpError, ctx: &mut HttpContext| {
                ctx.response.set_status(err.status);
                ctx.response.send(format!("handled: {}", err.message));
                Flow::Halt
            })
    });
    for reply in app.send(|| get("/fail")).await {
        assert_eq!(reply.status, 403);
        assert_eq!(reply.body, "handled: no entry");
    }
}

#[tokio::test]
async fn test_unmatched_request() {
    let storage = MetadataStorage::new();
    let app = App::new(&storage, quiet);
    let [from_hyper, from_tower] = app.send(|| get("/nope")).await;
    assert_eq!(from_hyper.status, 404);
    assert_eq!(from_hyper.body, "Cannot GET /nope");
    assert_eq!(from_tower.status, 404);
    assert_eq!(from_tower.body, "Not Found");
}

struct Tag(&'static str);

#[async_trait]
impl Interceptor for Tag {
    async fn intercept(
        &self,
        _action: &ActionContext,
        result: ActionResult,
    ) -> Result<ActionResult, HttpError> {
        match result {
            ActionResult::Text(text) => Ok(ActionResult::text(format!("{}{}", text, self.0))),
            other => Ok(other),
        }
    }
}

struct GlobalTag;

#[async_trait]
impl Interceptor for GlobalTag {
    async fn intercept(
        &self,
        action: &ActionContext,
        result: ActionResult,
    ) -> Result<ActionResult, HttpError> {
        Tag("[global]").intercept(action, result).await
    }
}

#[tokio::test]
async fn test_interceptor_order() {
    let mut storage = MetadataStorage::new();
    InterceptorDecl::new(GlobalTag).register(&mut storage);
    ControllerDecl::default::<PagesController>("")
        .use_interceptor(Tag("[controller]"))
        .action(
            ActionDecl::get(
                "page",
                "/page",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::text("page")) }),
            )
            .use_interceptor(Tag("[action]")),
        )
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .interceptor(ClassRef::external::<GlobalTag>())
            .controller(ClassRef::of::<PagesController>())
    });
    for reply in app.send(|| get("/page")).await {
        assert_eq!(reply.body, "page[global][controller][action]");
        assert_eq!(reply.header("content-type"), Some("text/html; charset=utf-8"));
    }
}

#[tokio::test]
async fn test_redirect_substitutes_params() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(
            ActionDecl::get(
                "go",
                "/go/:id",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::Json(json!({}))) }),
            )
            .redirect("/users/:id"),
        )
        .action(
            ActionDecl::get(
                "elsewhere",
                "/elsewhere",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::text("/override")) }),
            )
            .redirect("/default"),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/go/5")).await {
        assert_eq!(reply.status, 302);
        assert_eq!(reply.header("location"), Some("/users/5"));
    }
    for reply in app.send(|| get("/elsewhere")).await {
        assert_eq!(reply.header("location"), Some("/override"));
    }
}

#[tokio::test]
async fn test_current_user_required() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::get(
                "profile",
                "/profile",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(args.value(0).cloned().unwrap_or_default()))
                }),
            )
            .param(0, ParamDecl::current_user().required(true)),
        )
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .controller(ClassRef::of::<UsersController>())
            .current_user_checker(|action: &ActionContext| {
                Ok::<_, HttpError>(match action.request.get_header("x-user") {
                    Some(user) => ParamValue::Json(json!({"name": user})),
                    None => ParamValue::Undefined,
                })
            })
    });
    for reply in app.send(|| get("/profile")).await {
        assert_eq!(reply.status, 401);
    }
    let with_user = || {
        Request::builder()
            .uri("/profile")
            .header("x-user", "ann")
            .body(Full::new(Bytes::new()))
            .unwrap()
    };
    for reply in app.send(with_user).await {
        assert_eq!(reply.json(), json!({"name": "ann"}));
    }
}

#[tokio::test]
async fn test_context_param_only_on_tower() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::get(
                "ctx",
                "/ctx",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    let id = args.context(0).map(|ctx| ctx.action.id());
                    Ok(ActionResult::Json(json!({ "action": id })))
                }),
            )
            .param(0, ParamDecl::context()),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    let [from_hyper, from_tower] = app.send(|| get("/ctx")).await;
    assert_eq!(from_hyper.json(), json!({"action": null}));
    assert_eq!(from_tower.json(), json!({"action": "UsersController.ctx"}));
}

#[tokio::test]
async fn test_fallthrough_and_after_middleware() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(
            ActionDecl::get(
                "maybe",
                "/page",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::Undefined) }),
            )
            .fallthrough(),
        )
        .action(
            ActionDecl::get(
                "page",
                "/page",
                handler(|_: Arc<PagesController>, _| async { Ok(ActionResult::text("second")) }),
            )
            .use_after(|ctx: &mut HttpContext| {
                ctx.response.set_header("x-after", "1");
                Ok::<_, HttpError>(Flow::Next)
            }),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/page")).await {
        assert_eq!(reply.body, "second");
        assert_eq!(reply.header("x-after"), Some("1"));
    }
}

#[test]
fn test_invalid_prefix_fails_bootstrap() {
    let storage = MetadataStorage::new();
    let err = create_hyper_driver(&storage, RoutingConfig::new().route_prefix("/:a(/:a")).unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidPrefix { .. }));
}

fn post_raw(uri: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .unwrap()
}

fn declare_body_readers(storage: &mut MetadataStorage) {
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::post(
                "by_field",
                "/field",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(json!({ "name": args.value(0).cloned() })))
                }),
            )
            .param(0, ParamDecl::body_param("name")),
        )
        .action(
            ActionDecl::post(
                "whole",
                "/whole",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(args.value(0).cloned().unwrap_or_default()))
                }),
            )
            .param(0, ParamDecl::body().required(true)),
        )
        .register(storage);
}

#[tokio::test]
async fn test_body_param_reads_one_field() {
    let mut storage = MetadataStorage::new();
    declare_body_readers(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| post_json("/field", json!({"name": "ann", "age": 3}))).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({"name": "ann"}));
    }
    for reply in app.send(|| post_json("/field", json!({"age": 3}))).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({"name": null}));
    }
}

#[tokio::test]
async fn test_invalid_json_body_is_rejected() {
    let mut storage = MetadataStorage::new();
    declare_body_readers(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for uri in ["/field", "/whole"] {
        for reply in app.send(|| post_raw(uri, "{bad")).await {
            assert_eq!(reply.status, 400, "{}", uri);
            assert_eq!(reply.json()["name"], "ParamNormalizationError", "{}", uri);
        }
    }
    for reply in app.send(|| post_json("/field", json!(["ann"]))).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "BadRequestError");
    }
    for reply in app.send(|| post_raw("/whole", vec![0xff, 0xfe, 0xfd])).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "ParamNormalizationError");
    }
}

#[tokio::test]
async fn test_required_body_rejects_empty_object() {
    let mut storage = MetadataStorage::new();
    declare_body_readers(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| post_json("/whole", json!({}))).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "ParamRequiredError");
    }
    for reply in app.send(|| post_json("/whole", json!({"a": 1}))).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({"a": 1}));
    }
}

#[tokio::test]
async fn test_binary_and_stream_results() {
    use futures_util::StreamExt;

    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(ActionDecl::get(
            "download",
            "/download",
            handler(|_: Arc<PagesController>, _| async {
                Ok(ActionResult::bytes(vec![1u8, 2, 3]))
            }),
        ))
        .action(ActionDecl::get(
            "chunks",
            "/chunks",
            handler(|_: Arc<PagesController>, _| async {
                let chunks = vec![
                    Ok::<_, std::io::Error>(Bytes::from("ab")),
                    Ok(Bytes::from("cd")),
                ];
                Ok(ActionResult::stream(futures_util::stream::iter(chunks).boxed()))
            }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/download")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("content-type"), Some(actionroute::http::BINARY_CONTENT_TYPE));
        assert_eq!(reply.body.as_bytes(), &[1u8, 2, 3]);
    }
    for reply in app.send(|| get("/chunks")).await {
        assert_eq!(reply.header("content-type"), Some(actionroute::http::BINARY_CONTENT_TYPE));
        assert_eq!(reply.body, "abcd");
    }

    let head = |uri: &str| {
        Request::builder()
            .method("HEAD")
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    };
    for uri in ["/download", "/chunks"] {
        for reply in app.send(|| head(uri)).await {
            assert_eq!(reply.status, 200, "{}", uri);
            assert_eq!(reply.header("content-type"), Some(actionroute::http::BINARY_CONTENT_TYPE));
            assert!(reply.body.is_empty(), "{}", uri);
        }
    }
}

struct TitleRenderer;

#[async_trait]
impl TemplateRenderer for TitleRenderer {
    async fn render(&self, template: &str, data: &Value) -> Result<String, HttpError> {
        let title = data["title"].as_str().unwrap_or_default();
        Ok(format!("<{}>{}</{}>", template, title, template))
    }
}

#[tokio::test]
async fn test_render_with_template_renderer() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(
            ActionDecl::get(
                "index",
                "/",
                handler(|_: Arc<PagesController>, _| async {
                    Ok(ActionResult::Json(json!({"title": "Welcome"})))
                }),
            )
            .render("h1"),
        )
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .renderer(TitleRenderer)
            .controller(ClassRef::of::<PagesController>())
    });
    for reply in app.send(|| get("/")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(reply.body, "<h1>Welcome</h1>");
    }

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/")).await {
        assert_eq!(reply.status, 500);
    }
}

#[tokio::test]
async fn test_empty_results_substituted_with_errors() {
    use actionroute::metadata::ResultSubstitute;

    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/users")
        .action(
            ActionDecl::get(
                "missing",
                "/missing",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Undefined) }),
            )
            .on_undefined(ResultSubstitute::error(|| {
                HttpError::named(418, "TeapotError", "No user brewed.")
            })),
        )
        .action(
            ActionDecl::get(
                "empty",
                "/empty",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Null) }),
            )
            .on_null(ResultSubstitute::error(|| HttpError::not_found("User is gone."))),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| get("/users/missing")).await {
        assert_eq!(reply.status, 418);
        assert_eq!(reply.json(), json!({"name": "TeapotError", "message": "No user brewed."}));
    }
    for reply in app.send(|| get("/users/empty")).await {
        assert_eq!(reply.status, 404);
        assert_eq!(reply.json()["message"], "User is gone.");
    }
}

#[tokio::test]
async fn test_status_location_and_header_directives() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("/users")
        .header("x-controller", "users")
        .action(
            ActionDecl::post(
                "create",
                "/",
                handler(|_: Arc<UsersController>, _| async { Ok(ActionResult::Json(json!({"id": 5}))) }),
            )
            .http_code(201)
            .location("/users/5")
            .header("cache-control", "no-store"),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    for reply in app.send(|| post_json("/users", json!({}))).await {
        assert_eq!(reply.status, 201);
        assert_eq!(reply.header("location"), Some("/users/5"));
        assert_eq!(reply.header("cache-control"), Some("no-store"));
        assert_eq!(reply.header("x-controller"), Some("users"));
        assert_eq!(reply.json(), json!({"id": 5}));
    }
}

#[tokio::test]
async fn test_halting_before_middleware_skips_action() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();

    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("")
        .action(
            ActionDecl::get(
                "limited",
                "/limited",
                handler(move |_: Arc<PagesController>, _| {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(ActionResult::text("ran"))
                    }
                }),
            )
            .use_before(|ctx: &mut HttpContext| {
                ctx.response.set_status(429);
                ctx.response.send("slow down");
                Ok::<_, HttpError>(Flow::Halt)
            }),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/limited")).await {
        assert_eq!(reply.status, 429);
        assert_eq!(reply.body, "slow down");
    }
    assert!(!ran.load(Ordering::SeqCst));
}

struct TenantResolver;

#[async_trait]
impl CustomParamResolver for TenantResolver {
    async fn resolve(&self, action: &ActionContext) -> Result<ParamValue, HttpError> {
        Ok(match action.request.get_header("x-tenant") {
            Some(tenant) => ParamValue::string(tenant.to_uppercase()),
            None => ParamValue::Undefined,
        })
    }
}

#[tokio::test]
async fn test_custom_param_resolver() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(
            ActionDecl::get(
                "tenant",
                "/tenant",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(json!({ "tenant": args.str(0) })))
                }),
            )
            .param(0, ParamDecl::custom(TenantResolver).required(true)),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<UsersController>()));
    let with_tenant = || {
        Request::builder()
            .uri("/tenant")
            .header("x-tenant", "acme")
            .body(Full::new(Bytes::new()))
            .unwrap()
    };
    for reply in app.send(with_tenant).await {
        assert_eq!(reply.json(), json!({"tenant": "ACME"}));
    }
    for reply in app.send(|| get("/tenant")).await {
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["name"], "ParamRequiredError");
    }
}

#[tokio::test]
async fn test_regex_action_route() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::default::<PagesController>("/files")
        .action(
            ActionDecl::get(
                "text_file",
                regex::Regex::new(r"^/(?P<name>[a-z]+)\.txt$").unwrap(),
                handler(|_: Arc<PagesController>, args: Args| async move {
                    Ok(ActionResult::text(args.str(0).unwrap_or_default().to_string()))
                }),
            )
            .param(0, ParamDecl::param("name")),
        )
        .register(&mut storage);

    let app = App::new(&storage, || quiet().controller(ClassRef::of::<PagesController>()));
    for reply in app.send(|| get("/files/readme.txt")).await {
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "readme");
    }
    for reply in app.send(|| get("/files/readme.md")).await {
        assert_eq!(reply.status, 404);
    }
}

#[tokio::test]
async fn test_error_override_map() {
    let mut storage = MetadataStorage::new();
    ControllerDecl::json::<UsersController>("")
        .action(ActionDecl::get(
            "lookup",
            "/lookup",
            handler(|_: Arc<UsersController>, _| async {
                Err(HttpError::not_found("Raw lookup miss."))
            }),
        ))
        .register(&mut storage);

    let app = App::new(&storage, || {
        quiet()
            .override_error(
                "NotFoundError",
                ErrorOverride {
                    message: Some("Nothing here.".to_string()),
                    status: Some(410),
                },
            )
            .controller(ClassRef::of::<UsersController>())
    });
    for reply in app.send(|| get("/lookup")).await {
        assert_eq!(reply.status, 410);
        assert_eq!(reply.json(), json!({"name": "NotFoundError", "message": "Nothing here."}));
    }
}
