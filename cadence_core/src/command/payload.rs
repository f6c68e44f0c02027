use std::any::{Any, TypeId};
use std::fmt;

/// Owned, type-erased argument or response of a command
pub type Payload = Box<dyn Any + Send>;

/// Prototype describing the payload type a command expects or returns
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if `value` is an instance of this prototype
    pub fn matches(&self, value: &dyn Any) -> bool {
        value.type_id() == self.id
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Copy a type-checked argument into an owned payload for queueing
pub(crate) type CloneFn = fn(&dyn Any) -> Option<Payload>;

pub(crate) fn clone_payload<T: Any + Clone + Send>(value: &dyn Any) -> Option<Payload> {
    value
        .downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as Payload)
}
