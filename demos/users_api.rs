//! actionroute - example users API
//!
//! Serves an in-memory users collection behind `/api/users`.

use actionroute::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: i64,
    first_name: String,
    last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    first_name: String,
    last_name: String,
}

impl Validate for NewUser {
    fn validate(&self, _: &ValidationOptions) -> Result<(), Vec<ValidationFailure>> {
        let mut failures = Vec::new();
        if self.first_name.trim().is_empty() {
            failures.push(ValidationFailure::new("firstName", "isNotEmpty", "firstName should not be empty"));
        }
        if self.last_name.trim().is_empty() {
            failures.push(ValidationFailure::new("lastName", "isNotEmpty", "lastName should not be empty"));
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

/// Users controller backed by a shared vector.
#[derive(Default)]
struct UsersController {
    users: Mutex<Vec<User>>,
}

impl UsersController {
    fn find(&self, id: i64) -> Option<User> {
        self.users.lock().iter().find(|u| u.id == id).cloned()
    }

    fn insert(&self, input: &NewUser) -> User {
        let mut users = self.users.lock();
        let user = User {
            id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
        };
        users.push(user.clone());
        user
    }
}

fn declare(storage: &mut MetadataStorage) {
    ControllerDecl::json::<UsersController>("/users")
        .action(ActionDecl::get(
            "get_all",
            "/",
            handler(|ctrl: Arc<UsersController>, _| async move {
                let users = ctrl.users.lock().clone();
                ActionResult::json(&users)
            }),
        ))
        .action(
            ActionDecl::get(
                "get_one",
                "/:id",
                handler(|ctrl: Arc<UsersController>, args: Args| async move {
                    let id = args.i64(0).unwrap_or_default();
                    match ctrl.find(id) {
                        Some(user) => ActionResult::json(&user),
                        None => Ok(ActionResult::Undefined),
                    }
                }),
            )
            .param(0, ParamDecl::param("id").typed(ParamType::Number).required(true))
            .on_undefined(404),
        )
        .action(
            ActionDecl::post(
                "create",
                "/",
                handler(|ctrl: Arc<UsersController>, args: Args| async move {
                    let input = args
                        .typed::<NewUser>(0)
                        .ok_or_else(|| HttpError::bad_request("User body is required."))?;
                    ActionResult::json(&ctrl.insert(&input))
                }),
            )
            .param(0, ParamDecl::body().validated_class::<NewUser>().required(true))
            .http_code(201)
            .authorized(["admin"]),
        )
        .action(
            ActionDecl::delete(
                "remove",
                "/:id",
                handler(|ctrl: Arc<UsersController>, args: Args| async move {
                    let id = args.i64(0).unwrap_or_default();
                    let mut users = ctrl.users.lock();
                    let before = users.len();
                    users.retain(|u| u.id != id);
                    if users.len() == before {
                        return Err(HttpError::not_found(format!("User {} was not found.", id)));
                    }
                    Ok(ActionResult::Null)
                }),
            )
            .param(0, ParamDecl::param("id").typed(ParamType::Number))
            .authorized(["admin"]),
        )
        .action(
            ActionDecl::get(
                "me",
                "/me/profile",
                handler(|_: Arc<UsersController>, args: Args| async move {
                    Ok(ActionResult::Json(args.value(0).cloned().unwrap_or_default()))
                }),
            )
            .param(0, ParamDecl::current_user().required(true)),
        )
        .register(storage);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut storage = MetadataStorage::new();
    declare(&mut storage);

    let config = RoutingConfig::new()
        .port(3000)
        .route_prefix("/api")
        .cors(CorsOptions::default())
        .controller(ClassRef::of::<UsersController>())
        .authorization_checker(|action: &ActionContext, roles: &[String]| {
            let role = action.request.get_header("x-role").unwrap_or_default();
            Ok::<_, HttpError>(roles.is_empty() || roles.iter().any(|r| r == role))
        })
        .current_user_checker(|action: &ActionContext| {
            Ok::<_, HttpError>(match action.request.get_header("x-user") {
                Some(name) => ParamValue::Json(json!({ "name": name })),
                None => ParamValue::Undefined,
            })
        });

    let driver = create_hyper_driver(&storage, config)?;
    for route in driver.routes() {
        tracing::info!("{} {} -> {}", route.method, route.path, route.action);
    }
    tracing::info!("Try: curl http://localhost:3000/api/users");
    tracing::info!(
        "Try: curl -X POST -H 'x-role: admin' -H 'content-type: application/json' -d '{{\"firstName\":\"Ann\",\"lastName\":\"Lee\"}}' http://localhost:3000/api/users"
    );

    driver.run().await
}
