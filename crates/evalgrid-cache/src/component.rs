use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// A built, type-erased component instance. Clones share the instance.
#[derive(Clone)]
pub struct Component {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Component {
    /// Wraps a freshly built value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Borrows the instance as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns a shared handle to the instance as `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Returns true when both handles point at the same instance.
    pub fn same_instance(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("type", &self.type_name)
            .finish()
    }
}
