//! Class references and instance resolution.
//!
//! Metadata records point at controller, middleware and interceptor types
//! through a [`ClassRef`]. At request time a [`Resolver`] turns a class
//! reference into a live instance.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved controller (or other class) instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Reference to a Rust type participating in routing metadata.
#[derive(Clone, Copy)]
pub struct ClassRef {
    id: TypeId,
    name: &'static str,
    construct: Option<fn() -> Instance>,
}

impl ClassRef {
    /// Reference a type that can be built with `Default`.
    pub fn of<T: Default + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            construct: Some(construct_default::<T>),
        }
    }

    /// Reference a type that must come from a container.
    pub fn external<T: Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            construct: None,
        }
    }

    /// Type identity used to match declarations.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Short type name, used in action ids and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a fresh instance, if the type has a constructor.
    pub fn instantiate(&self) -> Option<Instance> {
        self.construct.map(|construct| construct())
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassRef {}

impl std::hash::Hash for ClassRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassRef({})", self.name)
    }
}

fn construct_default<T: Default + Send + Sync + 'static>() -> Instance {
    Arc::new(T::default())
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// Capability that produces instances for class references.
pub trait Resolver: Send + Sync {
    /// Resolve an instance, or `None` if this resolver does not know the type.
    fn resolve(&self, class: &ClassRef) -> Option<Instance>;
}

/// Explicitly populated instance container.
#[derive(Default)]
pub struct Container {
    instances: HashMap<TypeId, Instance>,
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance for its own type.
    pub fn with<T: Send + Sync + 'static>(mut self, instance: T) -> Self {
        self.instances.insert(TypeId::of::<T>(), Arc::new(instance));
        self
    }

    /// Register an already shared instance.
    pub fn with_shared<T: Send + Sync + 'static>(mut self, instance: Arc<T>) -> Self {
        self.instances.insert(TypeId::of::<T>(), instance);
        self
    }
}

impl Resolver for Container {
    fn resolve(&self, class: &ClassRef) -> Option<Instance> {
        self.instances.get(&class.type_id()).cloned()
    }
}

/// Builds each class once through its constructor and reuses the instance.
#[derive(Default)]
pub struct SingletonResolver {
    cache: Mutex<HashMap<TypeId, Instance>>,
}

impl SingletonResolver {
    /// Create a resolver with an empty singleton cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resolver for SingletonResolver {
    fn resolve(&self, class: &ClassRef) -> Option<Instance> {
        let mut cache = self.cache.lock();
        if let Some(instance) = cache.get(&class.type_id()) {
            return Some(instance.clone());
        }
        let instance = class.instantiate()?;
        cache.insert(class.type_id(), instance.clone());
        Some(instance)
    }
}

/// Tries `primary` first, then `fallback`.
pub struct FallbackResolver {
    primary: Arc<dyn Resolver>,
    fallback: Arc<dyn Resolver>,
}

impl FallbackResolver {
    /// Try `primary` first, then `fallback`.
    pub fn new(primary: Arc<dyn Resolver>, fallback: Arc<dyn Resolver>) -> Self {
        Self { primary, fallback }
    }
}

impl Resolver for FallbackResolver {
    fn resolve(&self, class: &ClassRef) -> Option<Instance> {
        self.primary
            .resolve(class)
            .or_else(|| self.fallback.resolve(class))
    }
}
