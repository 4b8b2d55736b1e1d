//! Compiles raw records into [`ControllerMetadata`] / [`ActionMetadata`] /
//! [`ParamMetadata`].
//!
//! Option cascades resolve from the most specific level outwards: action,
//! then controller, then the global settings. `None` inherits; an explicit
//! `Some(false)` is final.

use crate::config::RoutingSettings;
use crate::error::BootstrapError;
use crate::hooks::Interceptor;
use crate::metadata::compiled::{ActionMetadata, ControllerMetadata, ParamMetadata};
use crate::metadata::records::{
    ActionRecord, ControllerKind, ControllerRecord, MiddlewareRecord, ParamRecord,
    ResponseHandlerKind, ResponseHandlerRecord, RouteSpec, TransformToggles, ValidateOption,
};
use crate::metadata::storage::MetadataStorage;
use crate::metadata::ClassRef;
use crate::routing::RoutePattern;
use std::sync::Arc;
use tracing::debug;

/// Builds the compiled metadata tree for a set of controller classes.
pub struct MetadataBuilder<'a> {
    storage: &'a MetadataStorage,
    settings: &'a RoutingSettings,
    prefix: RouteSpec,
}

impl<'a> MetadataBuilder<'a> {
    /// Builder over `storage` using `settings` defaults and the route `prefix`.
    pub fn new(storage: &'a MetadataStorage, settings: &'a RoutingSettings, prefix: RouteSpec) -> Self {
        Self {
            storage,
            settings,
            prefix,
        }
    }

    /// Build controllers in the order given. Duplicated classes are built
    /// twice.
    pub fn build_controllers(
        &self,
        classes: &[ClassRef],
    ) -> Result<Vec<ControllerMetadata>, BootstrapError> {
        self.check_prefix()?;
        classes.iter().map(|class| self.build_controller(*class)).collect()
    }

    /// Global middlewares of the given classes, by ascending priority.
    pub fn build_middlewares(&self, classes: &[ClassRef]) -> Vec<&'a MiddlewareRecord> {
        let mut records = self.storage.filter_middlewares_for_classes(classes);
        records.sort_by_key(|m| m.priority);
        records
    }

    /// Global interceptors of the given classes, by ascending priority.
    pub fn build_interceptors(&self, classes: &[ClassRef]) -> Vec<Arc<dyn Interceptor>> {
        let mut records = self.storage.filter_interceptors_for_classes(classes);
        records.sort_by_key(|i| i.priority);
        records.into_iter().map(|i| i.interceptor.clone()).collect()
    }

    fn check_prefix(&self) -> Result<(), BootstrapError> {
        RoutePattern::compile(&self.prefix, &RouteSpec::None, &RouteSpec::None)
            .map(|_| ())
            .map_err(|err| BootstrapError::InvalidPrefix {
                prefix: match &self.prefix {
                    RouteSpec::Path(path) => path.clone(),
                    RouteSpec::Regex(regex) => regex.as_str().to_string(),
                    RouteSpec::None => String::new(),
                },
                reason: err.to_string(),
            })
    }

    fn build_controller(&self, class: ClassRef) -> Result<ControllerMetadata, BootstrapError> {
        let record = self.merge_controller_records(class);

        let mut actions = Vec::new();
        for source in record.extends.iter().chain(std::iter::once(&record.target)) {
            for action in self.storage.filter_actions_with_target(source) {
                actions.push(Arc::new(self.build_action(&record, action)?));
            }
        }

        debug!(
            "Built controller {} with {} action(s)",
            class.name(),
            actions.len()
        );

        Ok(ControllerMetadata {
            target: record.target,
            route: record.route,
            kind: record.kind,
            options: record.options,
            actions,
        })
    }

    fn merge_controller_records(&self, class: ClassRef) -> ControllerRecord {
        let records = self.storage.filter_controllers_for_classes(&[class]);
        if records.is_empty() {
            debug!("No controller declaration for {}, using defaults", class.name());
        }

        let mut merged = ControllerRecord {
            target: class,
            route: RouteSpec::None,
            kind: ControllerKind::Default,
            options: TransformToggles::default(),
            extends: Vec::new(),
        };
        for record in records {
            if !record.route.is_none() {
                merged.route = record.route.clone();
            }
            merged.kind = record.kind;
            merged.options.transform_request = record
                .options
                .transform_request
                .or(merged.options.transform_request);
            merged.options.transform_response = record
                .options
                .transform_response
                .or(merged.options.transform_response);
            merged.extends.extend(record.extends.iter().copied());
        }
        merged
    }

    fn build_action(
        &self,
        controller: &ControllerRecord,
        record: &ActionRecord,
    ) -> Result<ActionMetadata, BootstrapError> {
        let pattern = RoutePattern::compile(&self.prefix, &controller.route, &record.route)?;
        let scopes = self.scopes(controller, record);

        let transform_request = record
            .options
            .transform_request
            .or(controller.options.transform_request)
            .unwrap_or(self.settings.class_transformer);
        let transform_response = record
            .options
            .transform_response
            .or(controller.options.transform_response)
            .unwrap_or(self.settings.class_transformer);

        let mut params: Vec<ParamMetadata> = self
            .storage
            .filter_params_with_target_and_method(&record.target, &record.method)
            .into_iter()
            .map(|p| self.build_param(p, transform_request))
            .collect();
        params.sort_by_key(|p| p.index);
        let arg_count = params.iter().map(|p| p.index + 1).max().unwrap_or(0);

        let mut action = ActionMetadata {
            target: record.target,
            controller: controller.target,
            controller_kind: controller.kind,
            method: record.method.clone(),
            verb: record.verb.clone(),
            route: record.route.clone(),
            pattern,
            handler: record.handler.clone(),
            params,
            arg_count,
            authorized: None,
            content_type: None,
            headers: Vec::new(),
            success_code: None,
            redirect: None,
            location: None,
            render: None,
            null_result: None,
            undefined_result: None,
            fallthrough: false,
            terminates: false,
            response_transform: None,
            before: Vec::new(),
            after: Vec::new(),
            interceptors: Vec::new(),
        };

        let mut response_transform = None;
        for (target, method) in &scopes {
            for handler in self
                .storage
                .filter_response_handlers_with_target_and_method(target, *method)
            {
                apply_response_handler(&mut action, handler, &mut response_transform);
            }
            for use_record in self.storage.filter_uses_with_target_and_method(target, *method) {
                if use_record.after {
                    action.after.push(use_record.middleware.clone());
                } else {
                    action.before.push(use_record.middleware.clone());
                }
            }
            for use_record in self
                .storage
                .filter_interceptor_uses_with_target_and_method(target, *method)
            {
                action.interceptors.push(use_record.interceptor.clone());
            }
        }
        if transform_response {
            action.response_transform = response_transform.or_else(|| self.settings.class_to_plain.clone());
        }

        Ok(action)
    }

    /// Declaration scopes of an action, least specific first: the declaring
    /// class (for inherited actions), the controller, then the method.
    fn scopes<'r>(
        &self,
        controller: &'r ControllerRecord,
        record: &'r ActionRecord,
    ) -> Vec<(&'r ClassRef, Option<&'r str>)> {
        let mut scopes = Vec::with_capacity(3);
        if record.target != controller.target {
            scopes.push((&record.target, None));
        }
        scopes.push((&controller.target, None));
        scopes.push((&record.target, Some(record.method.as_str())));
        scopes
    }

    fn build_param(&self, record: &ParamRecord, transform_enabled: bool) -> ParamMetadata {
        let transform = if transform_enabled {
            Some(
                record
                    .transform
                    .clone()
                    .or_else(|| self.settings.plain_to_class.clone())
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        let validation = match &record.validate {
            Some(ValidateOption::Flag(false)) => None,
            Some(ValidateOption::Flag(true)) => Some(self.settings.validation_options.clone()),
            Some(ValidateOption::Options(options)) => Some(options.clone()),
            None if self.settings.validation => Some(self.settings.validation_options.clone()),
            None => None,
        };

        ParamMetadata {
            index: record.index,
            kind: record.kind,
            name: record.name.clone(),
            required: record
                .required
                .unwrap_or(self.settings.defaults.param_options.required),
            parse: record.parse,
            param_type: record.explicit_type.clone().unwrap_or_default(),
            is_array: record.is_array,
            transform,
            validation,
            resolver: record.resolver.clone(),
        }
    }
}

fn apply_response_handler(
    action: &mut ActionMetadata,
    record: &ResponseHandlerRecord,
    response_transform: &mut Option<crate::params::TransformOptions>,
) {
    match &record.handler {
        ResponseHandlerKind::Authorized(roles) => action.authorized = Some(roles.clone()),
        ResponseHandlerKind::ContentType(value) => action.content_type = Some(value.clone()),
        ResponseHandlerKind::Header(name, value) => {
            action.headers.push((name.clone(), value.clone()))
        }
        ResponseHandlerKind::Redirect(url) => action.redirect = Some(url.clone()),
        ResponseHandlerKind::Render(template) => action.render = Some(template.clone()),
        ResponseHandlerKind::HttpCode(code) => action.success_code = Some(*code),
        ResponseHandlerKind::OnNull(substitute) => action.null_result = Some(substitute.clone()),
        ResponseHandlerKind::OnUndefined(substitute) => {
            action.undefined_result = Some(substitute.clone())
        }
        ResponseHandlerKind::Location(url) => action.location = Some(url.clone()),
        ResponseHandlerKind::Fallthrough => action.fallthrough = true,
        ResponseHandlerKind::Terminates => action.terminates = true,
        ResponseHandlerKind::ResponseTransform(options) => {
            *response_transform = Some(options.clone())
        }
    }
}
