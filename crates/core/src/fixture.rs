//! The per-invocation fixture object.
//!
//! Setup methods put state in, test methods and teardown methods read it
//! back out. A fresh `Fixture` is created for every test method invocation
//! and dropped once its teardown chain has finished; nothing carries over
//! to the next invocation. Class-level setup gets its own `Fixture`, which
//! lives for the whole class and is visible read-only to invocations.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;

#[derive(Default)]
pub struct Fixture {
    values: HashMap<String, Box<dyn Any>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// `None` if the key is missing or holds a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Like [`get`](Self::get), but with an error message suitable for
    /// returning straight out of a method body with `?`.
    pub fn require<T: Any>(&self, key: &str) -> Result<&T, String> {
        match self.values.get(key) {
            Some(v) => v
                .downcast_ref::<T>()
                .ok_or_else(|| format!("fixture key '{}' is not a {}", key, type_name::<T>())),
            None => Err(format!("fixture key '{}' is not set", key)),
        }
    }

    pub fn require_mut<T: Any>(&mut self, key: &str) -> Result<&mut T, String> {
        match self.values.get_mut(key) {
            Some(v) => v
                .downcast_mut::<T>()
                .ok_or_else(|| format!("fixture key '{}' is not a {}", key, type_name::<T>())),
            None => Err(format!("fixture key '{}' is not set", key)),
        }
    }

    /// Remove and return the value, if present with the right type.
    /// A value of another type is left in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Fixture").field("keys", &keys).finish()
    }
}
