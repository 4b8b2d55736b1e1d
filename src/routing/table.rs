//! Ordered route table.
//!
//! Routes are kept in registration order and matched first-to-last, so the
//! first registered route wins when patterns overlap.

use crate::routing::{RoutePattern, Verb};
use hyper::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A route entry mapping a verb and path pattern to an action.
#[derive(Debug, Clone)]
pub struct Route<T> {
    /// HTTP verb for this route.
    pub verb: Verb,
    /// Compiled path pattern.
    pub pattern: RoutePattern,
    /// Identifier of the target action (`Controller.method`).
    pub action_id: String,
    /// Driver specific payload.
    pub target: T,
}

impl<T> Route<T> {
    /// Create a route serving `target`.
    pub fn new(verb: Verb, pattern: RoutePattern, action_id: impl Into<String>, target: T) -> Self {
        Self {
            verb,
            pattern,
            action_id: action_id.into(),
            target,
        }
    }

    /// Check if this route matches the given method and path, returning the
    /// captured parameters.
    pub fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if !self.verb.matches(method) {
            return None;
        }
        self.pattern.matches(path)
    }

    /// Plain description of the route.
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            method: self.verb.to_string(),
            path: self.pattern.path().to_string(),
            action: self.action_id.clone(),
        }
    }
}

/// Plain description of a registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub method: String,
    pub path: String,
    pub action: String,
}

/// Route table in registration order.
#[derive(Debug)]
pub struct RouteTable<T> {
    routes: Vec<Route<T>>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> RouteTable<T> {
    /// Create a new route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route at the end of the table and return its position.
    pub fn add(&mut self, route: Route<T>) -> usize {
        self.routes.push(route);
        self.routes.len() - 1
    }

    /// Route at `index`, in registration order.
    pub fn get(&self, index: usize) -> Option<&Route<T>> {
        self.routes.get(index)
    }

    /// Iterate routes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route<T>> {
        self.routes.iter()
    }

    /// Find the first route matching the method and path.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Route<T>, HashMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|r| r.matches(method, path).map(|params| (r, params)))
    }

    /// List all routes.
    pub fn list(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(Route::summary).collect()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Remove every route.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}
