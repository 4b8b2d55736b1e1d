//! Parameter types, coercion and the positional argument list handed to
//! action handlers.

use crate::action::{ActionContext, ResponseHandle};
use crate::error::{HttpError, ValidationFailure};
use crate::http::{ActionRequest, UploadedFile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

/// A transformed, typed parameter value.
pub type Typed = Arc<dyn Any + Send + Sync>;

type TransformFn = Arc<dyn Fn(Value) -> Result<Typed, serde_json::Error> + Send + Sync>;
type ValidateFn =
    Arc<dyn Fn(&Typed, &ValidationOptions) -> Result<(), Vec<ValidationFailure>> + Send + Sync>;

/// Options applied to plain values before/after (de)serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Object keys starting with any of these prefixes are dropped.
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
    /// Drop object keys whose value is `null`.
    #[serde(default)]
    pub exclude_null: bool,
}

impl TransformOptions {
    /// Drop object keys starting with `prefix`.
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    /// Drop object keys whose value is `null`.
    pub fn exclude_null(mut self, exclude: bool) -> Self {
        self.exclude_null = exclude;
        self
    }

    /// Apply the options recursively to a JSON value.
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, v)| {
                        !(self.exclude_null && v.is_null())
                            && !self.exclude_prefixes.iter().any(|p| k.starts_with(p.as_str()))
                    })
                    .map(|(k, v)| (k, self.apply(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.apply(v)).collect()),
            other => other,
        }
    }
}

/// Options forwarded to [`Validate::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Skip checks for properties that are absent.
    #[serde(default)]
    pub skip_missing_properties: bool,
    /// Validation groups to run.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Validation hook for transformed parameter types.
pub trait Validate {
    fn validate(&self, options: &ValidationOptions) -> Result<(), Vec<ValidationFailure>>;
}

/// Describes how a class-typed parameter is built from plain JSON.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: &'static str,
    one: TransformFn,
    many: TransformFn,
    validate_one: Option<ValidateFn>,
    validate_many: Option<ValidateFn>,
}

impl TypeDescriptor {
    /// Descriptor for a deserializable type without validation.
    pub fn of<T: DeserializeOwned + Send + Sync + 'static>() -> Self {
        Self {
            name: short_name::<T>(),
            one: Arc::new(|v| Ok(Arc::new(serde_json::from_value::<T>(v)?) as Typed)),
            many: Arc::new(|v| Ok(Arc::new(serde_json::from_value::<Vec<T>>(v)?) as Typed)),
            validate_one: None,
            validate_many: None,
        }
    }

    /// Descriptor for a deserializable type that also validates itself.
    pub fn validated<T: DeserializeOwned + Validate + Send + Sync + 'static>() -> Self {
        let mut desc = Self::of::<T>();
        desc.validate_one = Some(Arc::new(|typed, options| match typed.downcast_ref::<T>() {
            Some(instance) => instance.validate(options),
            None => Ok(()),
        }));
        desc.validate_many = Some(Arc::new(|typed, options| {
            let Some(items) = typed.downcast_ref::<Vec<T>>() else {
                return Ok(());
            };
            let mut failures = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if let Err(errs) = item.validate(options) {
                    failures.extend(errs.into_iter().map(|mut f| {
                        f.property = format!("[{}].{}", i, f.property);
                        f
                    }));
                }
            }
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures)
            }
        }));
        desc
    }

    /// Type name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the type implements [`Validate`].
    pub fn is_validated(&self) -> bool {
        self.validate_one.is_some()
    }

    /// Build a typed instance (or `Vec` of instances) from plain JSON.
    pub fn transform(&self, value: Value, is_array: bool) -> Result<Typed, serde_json::Error> {
        if is_array {
            (self.many)(value)
        } else {
            (self.one)(value)
        }
    }

    /// Run validation on a transformed value.
    pub fn validate(
        &self,
        typed: &Typed,
        is_array: bool,
        options: &ValidationOptions,
    ) -> Result<(), Vec<ValidationFailure>> {
        let validator = if is_array {
            &self.validate_many
        } else {
            &self.validate_one
        };
        match validator {
            Some(validate) => validate(typed, options),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeDescriptor({})", self.name)
    }
}

fn short_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Default)]
pub enum ParamType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Class(TypeDescriptor),
}

impl ParamType {
    /// Whether values are transformed into a class.
    pub fn is_class(&self) -> bool {
        matches!(self, ParamType::Class(_))
    }

    fn target_name(&self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Class(desc) => desc.name(),
        }
    }

    /// Coerce a raw value into this type. Only strings (and arrays of strings)
    /// are converted; already structured values pass through.
    pub fn coerce(&self, name: &str, value: Value, is_array: bool) -> Result<Value, HttpError> {
        if is_array {
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            let coerced = items
                .into_iter()
                .map(|item| self.coerce_one(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array(coerced));
        }
        self.coerce_one(name, value)
    }

    fn coerce_one(&self, name: &str, value: Value) -> Result<Value, HttpError> {
        let Value::String(raw) = value else {
            return Ok(value);
        };
        match self {
            ParamType::Number => {
                if raw.is_empty() {
                    return Ok(Value::String(raw));
                }
                if let Ok(int) = raw.parse::<i64>() {
                    return Ok(Value::from(int));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| HttpError::param_normalization(name, &raw, self.target_name()))
            }
            ParamType::Boolean => match raw.as_str() {
                "" => Ok(Value::String(raw)),
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(HttpError::param_normalization(name, &raw, self.target_name())),
            },
            _ => Ok(Value::String(raw)),
        }
    }
}

/// Parse a string value as JSON.
pub fn parse_json(name: &str, value: Value, target: &ParamType) -> Result<Value, HttpError> {
    match value {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|_| HttpError::param_normalization(name, &raw, target.target_name())),
        other => Ok(other),
    }
}

/// One resolved argument of an action.
#[derive(Clone, Default)]
pub enum ParamValue {
    /// Nothing was found (or the slot has no declaration).
    #[default]
    Undefined,
    /// Plain JSON value.
    Json(Value),
    /// Transformed instance produced by a [`TypeDescriptor`].
    Typed(Typed),
    Request(Arc<ActionRequest>),
    Response(ResponseHandle),
    Context(ActionContext),
    File(UploadedFile),
    Files(Vec<UploadedFile>),
    /// Value produced by a custom resolver.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ParamValue {
    /// Whether nothing was found.
    pub fn is_undefined(&self) -> bool {
        matches!(self, ParamValue::Undefined)
    }

    /// Missing for the purposes of a `required` check.
    pub fn is_missing(&self) -> bool {
        match self {
            ParamValue::Undefined => true,
            ParamValue::Json(Value::Null) => true,
            ParamValue::Json(Value::String(s)) => s.is_empty(),
            ParamValue::Files(files) => files.is_empty(),
            _ => false,
        }
    }

    /// JSON string value.
    pub fn string(value: impl Into<String>) -> Self {
        ParamValue::Json(Value::String(value.into()))
    }

    /// JSON object value.
    pub fn object(map: Map<String, Value>) -> Self {
        ParamValue::Json(Value::Object(map))
    }
}

impl From<Option<Value>> for ParamValue {
    fn from(value: Option<Value>) -> Self {
        value.map(ParamValue::Json).unwrap_or_default()
    }
}

impl std::fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Undefined => write!(f, "Undefined"),
            ParamValue::Json(v) => write!(f, "Json({})", v),
            ParamValue::Typed(_) => write!(f, "Typed(..)"),
            ParamValue::Request(r) => write!(f, "Request({} {})", r.method, r.url),
            ParamValue::Response(_) => write!(f, "Response"),
            ParamValue::Context(_) => write!(f, "Context"),
            ParamValue::File(file) => write!(f, "File({})", file.field_name),
            ParamValue::Files(files) => write!(f, "Files({})", files.len()),
            ParamValue::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Positional arguments for an action handler, in parameter index order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<ParamValue>,
}

impl Args {
    /// Arguments in index order.
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw argument at `index`. Out of range indices are `Undefined`.
    pub fn get(&self, index: usize) -> &ParamValue {
        const UNDEFINED: &ParamValue = &ParamValue::Undefined;
        self.values.get(index).unwrap_or(UNDEFINED)
    }

    /// Plain JSON argument.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.get(index) {
            ParamValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Argument as a string.
    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index).and_then(Value::as_str)
    }

    /// Argument as an integer.
    pub fn i64(&self, index: usize) -> Option<i64> {
        self.value(index).and_then(Value::as_i64)
    }

    /// Argument as a float.
    pub fn f64(&self, index: usize) -> Option<f64> {
        self.value(index).and_then(Value::as_f64)
    }

    /// Argument as a boolean.
    pub fn bool(&self, index: usize) -> Option<bool> {
        self.value(index).and_then(Value::as_bool)
    }

    /// Deserialize a plain JSON argument.
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, HttpError> {
        match self.value(index) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    /// Transformed instance, if the argument was transformed into `T`.
    pub fn typed<T: Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        match self.get(index) {
            ParamValue::Typed(t) | ParamValue::Custom(t) => t.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Injected request.
    pub fn request(&self, index: usize) -> Option<&Arc<ActionRequest>> {
        match self.get(index) {
            ParamValue::Request(r) => Some(r),
            _ => None,
        }
    }

    /// Injected response handle.
    pub fn response(&self, index: usize) -> Option<&ResponseHandle> {
        match self.get(index) {
            ParamValue::Response(r) => Some(r),
            _ => None,
        }
    }

    /// Injected action context.
    pub fn context(&self, index: usize) -> Option<&ActionContext> {
        match self.get(index) {
            ParamValue::Context(c) => Some(c),
            _ => None,
        }
    }

    /// Injected uploaded file.
    pub fn file(&self, index: usize) -> Option<&UploadedFile> {
        match self.get(index) {
            ParamValue::File(f) => Some(f),
            _ => None,
        }
    }

    /// Injected uploaded files. Empty when absent.
    pub fn files(&self, index: usize) -> &[UploadedFile] {
        match self.get(index) {
            ParamValue::Files(f) => f,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct User {
        #[serde(rename = "firstName")]
        first_name: String,
    }

    impl Validate for User {
        fn validate(&self, _: &ValidationOptions) -> Result<(), Vec<ValidationFailure>> {
            if self.first_name.len() < 2 {
                return Err(vec![ValidationFailure::new(
                    "firstName",
                    "minLength",
                    "firstName is too short",
                )]);
            }
            Ok(())
        }
    }

    #[test]
    fn test_number_coercion_keeps_zero() {
        let ty = ParamType::Number;
        assert_eq!(ty.coerce("n", json!("0"), false).unwrap(), json!(0));
        assert_eq!(ty.coerce("n", json!("1.5"), false).unwrap(), json!(1.5));
        assert_eq!(ty.coerce("n", json!(["1", "2"]), true).unwrap(), json!([1, 2]));
        let err = ty.coerce("n", json!("abc"), false).unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.name, "ParamNormalizationError");
    }

    #[test]
    fn test_boolean_coercion() {
        let ty = ParamType::Boolean;
        assert_eq!(ty.coerce("b", json!("false"), false).unwrap(), json!(false));
        assert_eq!(ty.coerce("b", json!("1"), false).unwrap(), json!(true));
        assert!(ty.coerce("b", json!("maybe"), false).is_err());
    }

    #[test]
    fn test_missing_semantics() {
        assert!(ParamValue::Undefined.is_missing());
        assert!(ParamValue::string("").is_missing());
        assert!(ParamValue::Json(Value::Null).is_missing());
        assert!(!ParamValue::Json(json!(0)).is_missing());
        assert!(!ParamValue::Json(json!(false)).is_missing());
    }

    #[test]
    fn test_type_descriptor_transform_and_validate() {
        let desc = TypeDescriptor::validated::<User>();
        let typed = desc.transform(json!({"firstName": "Timber"}), false).unwrap();
        assert!(desc.validate(&typed, false, &ValidationOptions::default()).is_ok());

        let short = desc.transform(json!({"firstName": "T"}), false).unwrap();
        let failures = desc
            .validate(&short, false, &ValidationOptions::default())
            .unwrap_err();
        assert_eq!(failures[0].property, "firstName");

        let many = desc
            .transform(json!([{"firstName": "Ok"}, {"firstName": "x"}]), true)
            .unwrap();
        let failures = desc
            .validate(&many, true, &ValidationOptions::default())
            .unwrap_err();
        assert_eq!(failures[0].property, "[1].firstName");
    }

    #[test]
    fn test_transform_options_apply() {
        let options = TransformOptions::default().exclude_prefix("_").exclude_null(true);
        let out = options.apply(json!({"id": 1, "_secret": "x", "gone": null, "nested": [{"_a": 1, "b": 2}]}));
        assert_eq!(out, json!({"id": 1, "nested": [{"b": 2}]}));
    }

    #[test]
    fn test_args_accessors() {
        let args = Args::new(vec![
            ParamValue::Json(json!(5)),
            ParamValue::Undefined,
            ParamValue::string("abc"),
        ]);
        assert_eq!(args.i64(0), Some(5));
        assert!(args.get(1).is_undefined());
        assert_eq!(args.str(2), Some("abc"));
        assert!(args.get(10).is_undefined());
    }
}
