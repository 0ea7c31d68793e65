//! Core vocabulary shared by every other module.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// States that can end a run.
///
/// Once [`is_terminal`](Terminal::is_terminal) returns `true` the loop
/// tears down and no further transition is applied.
pub trait Terminal {
    fn is_terminal(&self) -> bool;
}

/// Identifier of a cancellable operation.
///
/// At most one operation runs under a given identifier. Dispatching a new
/// operation with the same identifier cancels the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Cow<'static, str>);

impl EffectId {
    /// Identifier from a static name, without allocating.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// A fresh identifier that collides with nothing else.
    pub fn unique() -> Self {
        Self(Cow::Owned(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EffectId {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for EffectId {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl From<Uuid> for EffectId {
    fn from(id: Uuid) -> Self {
        Self(Cow::Owned(id.to_string()))
    }
}

/// Events produced synchronously by an action. Most actions yield zero,
/// one, or two events, which stay inline.
pub type Events<E> = SmallVec<[E; 2]>;

/// Conversion from an action's return value into follow-up events.
///
/// Implemented for `()` (no events), `Option<E>`, `Vec<E>`, arrays, and
/// [`Events`].
pub trait IntoEvents<E> {
    fn into_events(self) -> Events<E>;
}

impl<E> IntoEvents<E> for () {
    fn into_events(self) -> Events<E> {
        SmallVec::new()
    }
}

impl<E> IntoEvents<E> for Option<E> {
    fn into_events(self) -> Events<E> {
        self.into_iter().collect()
    }
}

impl<E> IntoEvents<E> for Vec<E> {
    fn into_events(self) -> Events<E> {
        SmallVec::from_vec(self)
    }
}

impl<E, const N: usize> IntoEvents<E> for [E; N] {
    fn into_events(self) -> Events<E> {
        self.into_iter().collect()
    }
}

impl<E> IntoEvents<E> for Events<E> {
    fn into_events(self) -> Events<E> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_compare_by_name() {
        let a = EffectId::from("search");
        let b = EffectId::from(String::from("search"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "search");
    }

    #[test]
    fn unique_ids_differ() {
        assert_ne!(EffectId::unique(), EffectId::unique());
    }

    #[test]
    fn effect_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&EffectId::from("timer")).unwrap();
        assert_eq!(json, "\"timer\"");
        let back: EffectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "timer");
    }

    #[test]
    fn return_values_convert_to_events() {
        assert!(IntoEvents::<u8>::into_events(()).is_empty());
        assert_eq!(Some(1u8).into_events().as_slice(), &[1]);
        assert!(None::<u8>.into_events().is_empty());
        assert_eq!(vec![1u8, 2, 3].into_events().as_slice(), &[1, 2, 3]);
        assert_eq!([4u8, 5].into_events().as_slice(), &[4, 5]);
    }
}
