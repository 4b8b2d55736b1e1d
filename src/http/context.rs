//! Per-request context object passed through middlewares and routes.

use crate::http::{ActionRequest, ActionResponse};
use std::sync::Arc;

/// Request and response travelling together through a driver.
#[derive(Debug, Default)]
pub struct HttpContext {
    /// The inbound request. Shared with actions once routing starts.
    pub request: Arc<ActionRequest>,
    /// The outbound response.
    pub response: ActionResponse,
}

impl HttpContext {
    /// Pair `request` with an empty response.
    pub fn new(request: ActionRequest) -> Self {
        Self {
            request: Arc::new(request),
            response: ActionResponse::new(),
        }
    }

    /// Mutable access to the request, cloning it if an action still holds it.
    pub fn request_mut(&mut self) -> &mut ActionRequest {
        Arc::make_mut(&mut self.request)
    }
}
