//! Append-only store of raw declarations.
//!
//! Declarations push records here as application code registers its
//! controllers. Bootstrap reads them back through the `filter_*` projections,
//! which always preserve insertion order.

use crate::metadata::records::{
    ActionRecord, ControllerRecord, InterceptorRecord, InterceptorUseRecord, MiddlewareRecord,
    ParamRecord, ResponseHandlerRecord, UseRecord,
};
use crate::metadata::ClassRef;
use tracing::debug;

/// Store for every raw metadata record of one application.
#[derive(Default)]
pub struct MetadataStorage {
    controllers: Vec<ControllerRecord>,
    actions: Vec<ActionRecord>,
    params: Vec<ParamRecord>,
    response_handlers: Vec<ResponseHandlerRecord>,
    uses: Vec<UseRecord>,
    interceptor_uses: Vec<InterceptorUseRecord>,
    middlewares: Vec<MiddlewareRecord>,
    interceptors: Vec<InterceptorRecord>,
}

impl MetadataStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a controller declaration.
    pub fn push_controller(&mut self, record: ControllerRecord) {
        self.controllers.push(record);
    }

    /// Append an action declaration.
    pub fn push_action(&mut self, record: ActionRecord) {
        self.actions.push(record);
    }

    /// Append a parameter declaration.
    pub fn push_param(&mut self, record: ParamRecord) {
        self.params.push(record);
    }

    /// Append a response-handler directive.
    pub fn push_response_handler(&mut self, record: ResponseHandlerRecord) {
        self.response_handlers.push(record);
    }

    /// Append a controller- or action-level middleware use.
    pub fn push_use(&mut self, record: UseRecord) {
        self.uses.push(record);
    }

    /// Append a controller- or action-level interceptor use.
    pub fn push_interceptor_use(&mut self, record: InterceptorUseRecord) {
        self.interceptor_uses.push(record);
    }

    /// Append a global middleware declaration.
    pub fn push_middleware(&mut self, record: MiddlewareRecord) {
        self.middlewares.push(record);
    }

    /// Append a global interceptor declaration.
    pub fn push_interceptor(&mut self, record: InterceptorRecord) {
        self.interceptors.push(record);
    }

    /// Controllers declared on any of `classes`, in declaration order.
    pub fn filter_controllers_for_classes(&self, classes: &[ClassRef]) -> Vec<&ControllerRecord> {
        self.controllers
            .iter()
            .filter(|c| classes.contains(&c.target))
            .collect()
    }

    /// Actions declared on `target`, in declaration order.
    pub fn filter_actions_with_target(&self, target: &ClassRef) -> Vec<&ActionRecord> {
        self.actions.iter().filter(|a| &a.target == target).collect()
    }

    /// Parameters of one action, in declaration order.
    pub fn filter_params_with_target_and_method(
        &self,
        target: &ClassRef,
        method: &str,
    ) -> Vec<&ParamRecord> {
        self.params
            .iter()
            .filter(|p| &p.target == target && p.method == method)
            .collect()
    }

    /// Response handlers for one method. Passing `None` selects the
    /// controller-wide handlers.
    pub fn filter_response_handlers_with_target_and_method(
        &self,
        target: &ClassRef,
        method: Option<&str>,
    ) -> Vec<&ResponseHandlerRecord> {
        self.response_handlers
            .iter()
            .filter(|h| &h.target == target && h.method.as_deref() == method)
            .collect()
    }

    /// Middleware uses for one method. `None` selects the
    /// controller-wide uses.
    pub fn filter_uses_with_target_and_method(
        &self,
        target: &ClassRef,
        method: Option<&str>,
    ) -> Vec<&UseRecord> {
        self.uses
            .iter()
            .filter(|u| &u.target == target && u.method.as_deref() == method)
            .collect()
    }

    /// Interceptor uses for one method. `None` selects the
    /// controller-wide uses.
    pub fn filter_interceptor_uses_with_target_and_method(
        &self,
        target: &ClassRef,
        method: Option<&str>,
    ) -> Vec<&InterceptorUseRecord> {
        self.interceptor_uses
            .iter()
            .filter(|u| &u.target == target && u.method.as_deref() == method)
            .collect()
    }

    /// Global middlewares declared by any of `classes`.
    pub fn filter_middlewares_for_classes(&self, classes: &[ClassRef]) -> Vec<&MiddlewareRecord> {
        self.middlewares
            .iter()
            .filter(|m| classes.contains(&m.target))
            .collect()
    }

    /// Global interceptors declared by any of `classes`.
    pub fn filter_interceptors_for_classes(&self, classes: &[ClassRef]) -> Vec<&InterceptorRecord> {
        self.interceptors
            .iter()
            .filter(|i| classes.contains(&i.target))
            .collect()
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.controllers.len()
            + self.actions.len()
            + self.params.len()
            + self.response_handlers.len()
            + self.uses.len()
            + self.interceptor_uses.len()
            + self.middlewares.len()
            + self.interceptors.len()
    }

    /// Whether no record has been pushed since creation or the last reset.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record.
    pub fn reset(&mut self) {
        debug!("Resetting metadata storage ({} records)", self.len());
        self.controllers.clear();
        self.actions.clear();
        self.params.clear();
        self.response_handlers.clear();
        self.uses.clear();
        self.interceptor_uses.clear();
        self.middlewares.clear();
        self.interceptors.clear();
    }

    /// Release the store once an application no longer needs it.
    pub fn dispose(self) {
        debug!("Disposing metadata storage ({} records)", self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{handler, ActionResult};
    use crate::metadata::records::{ControllerKind, ParamKind, RouteSpec, TransformToggles};
    use crate::routing::Verb;
    use std::sync::Arc;

    #[derive(Default)]
    struct PostsController;

    #[derive(Default)]
    struct OtherController;

    fn action(target: ClassRef, method: &str) -> ActionRecord {
        ActionRecord {
            target,
            method: method.to_string(),
            verb: Verb::get(),
            route: RouteSpec::from("/"),
            handler: handler(|_: Arc<PostsController>, _| async { Ok(ActionResult::Null) }),
            options: TransformToggles::default(),
        }
    }

    fn param(target: ClassRef, method: &str, index: usize) -> ParamRecord {
        ParamRecord {
            target,
            method: method.to_string(),
            index,
            kind: ParamKind::Query,
            name: Some(format!("p{}", index)),
            required: None,
            parse: false,
            explicit_type: None,
            transform: None,
            validate: None,
            is_array: false,
            resolver: None,
        }
    }

    #[test]
    fn test_filters_preserve_insertion_order() {
        let posts = ClassRef::of::<PostsController>();
        let other = ClassRef::of::<OtherController>();
        let mut storage = MetadataStorage::new();

        storage.push_action(action(posts, "list"));
        storage.push_action(action(other, "list"));
        storage.push_action(action(posts, "get"));
        storage.push_param(param(posts, "get", 1));
        storage.push_param(param(posts, "get", 0));
        storage.push_param(param(posts, "list", 0));

        let actions = storage.filter_actions_with_target(&posts);
        let names: Vec<_> = actions.iter().map(|a| a.method.as_str()).collect();
        assert_eq!(names, vec!["list", "get"]);

        let params = storage.filter_params_with_target_and_method(&posts, "get");
        let indices: Vec<_> = params.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 0]);
    }

    #[test]
    fn test_filter_controllers_for_classes() {
        let posts = ClassRef::of::<PostsController>();
        let other = ClassRef::of::<OtherController>();
        let mut storage = MetadataStorage::new();
        storage.push_controller(ControllerRecord {
            target: posts,
            route: RouteSpec::from("/posts"),
            kind: ControllerKind::Json,
            options: TransformToggles::default(),
            extends: Vec::new(),
        });

        assert_eq!(storage.filter_controllers_for_classes(&[posts]).len(), 1);
        assert!(storage.filter_controllers_for_classes(&[other]).is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let posts = ClassRef::of::<PostsController>();
        let mut storage = MetadataStorage::new();
        storage.push_action(action(posts, "list"));
        storage.push_param(param(posts, "list", 0));
        assert_eq!(storage.len(), 2);

        storage.reset();
        assert!(storage.is_empty());
        assert!(storage.filter_actions_with_target(&posts).is_empty());
    }
}
