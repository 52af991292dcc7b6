use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

/// A reference field that is either a bare id or a fully resolved record.
///
/// List endpoints serialize bare ids; detail endpoints resolve the referenced
/// rows explicitly before building their view. The untagged representation
/// keeps the wire shape of both forms: a UUID string, or the full object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(Uuid),
    Resolved(Box<T>),
}

/// Implemented by records that can stand behind a [`Ref`].
pub trait HasId {
    fn record_id(&self) -> Uuid;
}

impl<T> Ref<T> {
    pub fn resolved(value: T) -> Self {
        Ref::Resolved(Box::new(value))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Ref::Resolved(_))
    }

    pub fn as_resolved(&self) -> Option<&T> {
        match self {
            Ref::Resolved(value) => Some(value),
            Ref::Id(_) => None,
        }
    }
}

impl<T: HasId> Ref<T> {
    /// The referenced id, regardless of resolution state.
    pub fn id(&self) -> Uuid {
        match self {
            Ref::Id(id) => *id,
            Ref::Resolved(value) => value.record_id(),
        }
    }
}
