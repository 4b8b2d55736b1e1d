//! Declaration records and the metadata compiled from them.

mod builder;
mod class;
mod compiled;
mod records;
mod storage;

pub use builder::MetadataBuilder;
pub use class::{ClassRef, Container, FallbackResolver, Instance, Resolver, SingletonResolver};
pub use compiled::{ActionMetadata, ControllerMetadata, ParamMetadata};
pub use records::{
    ActionRecord, ControllerKind, ControllerRecord, InterceptorRecord, InterceptorUseRecord,
    MiddlewareRecord, ParamKind, ParamRecord, ResponseHandlerKind, ResponseHandlerRecord,
    ResultSubstitute, RouteSpec, TransformToggles, UseRecord, ValidateOption,
};
pub use storage::MetadataStorage;
