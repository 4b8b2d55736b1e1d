//! Collaborators invoked by the action executor.

use crate::action::{ActionContext, ActionResult};
use crate::error::HttpError;
use crate::params::ParamValue;
use async_trait::async_trait;
use serde_json::Value;

/// Decides whether the current request may run an authorized action.
#[async_trait]
pub trait AuthorizationChecker: Send + Sync {
    /// `roles` is empty when any authenticated principal is accepted.
    async fn check(&self, action: &ActionContext, roles: &[String]) -> Result<bool, HttpError>;
}

#[async_trait]
impl<F> AuthorizationChecker for F
where
    F: Fn(&ActionContext, &[String]) -> Result<bool, HttpError> + Send + Sync,
{
    async fn check(&self, action: &ActionContext, roles: &[String]) -> Result<bool, HttpError> {
        self(action, roles)
    }
}

/// Produces the value of current-user parameters.
#[async_trait]
pub trait CurrentUserChecker: Send + Sync {
    /// Return [`ParamValue::Undefined`] when nobody is logged in.
    async fn current_user(&self, action: &ActionContext) -> Result<ParamValue, HttpError>;
}

#[async_trait]
impl<F> CurrentUserChecker for F
where
    F: Fn(&ActionContext) -> Result<ParamValue, HttpError> + Send + Sync,
{
    async fn current_user(&self, action: &ActionContext) -> Result<ParamValue, HttpError> {
        self(action)
    }
}

/// Transforms a successful action result before it is written.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        action: &ActionContext,
        result: ActionResult,
    ) -> Result<ActionResult, HttpError>;
}

/// Resolves the value of a custom parameter.
#[async_trait]
pub trait CustomParamResolver: Send + Sync {
    async fn resolve(&self, action: &ActionContext) -> Result<ParamValue, HttpError>;
}

/// Renders templates for actions declaring a `render` directive.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, template: &str, data: &Value) -> Result<String, HttpError>;
}
