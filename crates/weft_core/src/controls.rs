//! Control value resolution and the controls cache.
//!
//! The cache lives outside of the evaluation graph. It remembers the values
//! a user set on each node's controls so that they survive the node being
//! dropped from working state and recreated later.

use crate::node::{self, Control, Value, Values};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use thiserror::Error;

/// Host-provided storage for the last known controls of each node.
///
/// Implementations use interior mutability. The core never assumes anything
/// about how or where the controls are stored.
pub trait ControlsCache {
    /// The cached controls for the given node, if any.
    fn get(&self, id: &str) -> Option<Vec<Control>>;
    /// Remember the given controls. `None` or an empty list forgets the node.
    fn set(&self, id: &str, controls: Option<Vec<Control>>);
}

/// A cache that remembers nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

/// An in-memory cache that can be persisted alongside the canvas layout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MemoryCache {
    entries: RefCell<BTreeMap<node::Id, Vec<Control>>>,
}

/// Failed to persist or restore a [`MemoryCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize controls cache: {0}")]
    Serialize(#[from] ron::Error),
    #[error("failed to parse controls cache: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

impl ControlsCache for NoCache {
    fn get(&self, _id: &str) -> Option<Vec<Control>> {
        None
    }

    fn set(&self, _id: &str, _controls: Option<Vec<Control>>) {}
}

impl ControlsCache for MemoryCache {
    fn get(&self, id: &str) -> Option<Vec<Control>> {
        self.entries.borrow().get(id).cloned()
    }

    fn set(&self, id: &str, controls: Option<Vec<Control>>) {
        let mut entries = self.entries.borrow_mut();
        match controls {
            Some(controls) if !controls.is_empty() => {
                entries.insert(id.to_string(), controls);
            }
            _ => {
                entries.remove(id);
            }
        }
    }
}

impl<C> ControlsCache for &C
where
    C: ?Sized + ControlsCache,
{
    fn get(&self, id: &str) -> Option<Vec<Control>> {
        (**self).get(id)
    }

    fn set(&self, id: &str, controls: Option<Vec<Control>>) {
        (**self).set(id, controls)
    }
}

impl<C> ControlsCache for Rc<C>
where
    C: ?Sized + ControlsCache,
{
    fn get(&self, id: &str) -> Option<Vec<Control>> {
        (**self).get(id)
    }

    fn set(&self, id: &str, controls: Option<Vec<Control>>) {
        (**self).set(id, controls)
    }
}

impl MemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of nodes with cached controls.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop cached controls for every node not in `keep`.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) {
        self.entries.borrow_mut().retain(|id, _| keep(id));
    }

    /// Serialize the cache to a RON string.
    pub fn to_ron(&self) -> Result<String, CacheError> {
        Ok(ron::to_string(self)?)
    }

    /// Restore a cache from a RON string produced by [`MemoryCache::to_ron`].
    pub fn from_ron(s: &str) -> Result<Self, CacheError> {
        Ok(ron::from_str(s)?)
    }
}

/// The value a control resolves to: its user-set value if present, otherwise
/// its default.
pub fn resolve(control: &Control) -> &Value {
    match &control.current_value {
        Some(value) if !value.is_null() => value,
        _ => &control.default_value,
    }
}

/// The resolved value of every control, keyed by name.
pub fn values(controls: &[Control]) -> Values {
    controls
        .iter()
        .map(|c| (c.name.clone(), resolve(c).clone()))
        .collect()
}

/// Merge freshly declared controls with the previous ones.
///
/// Each control in `next` that carries no user-set value inherits the
/// previous value of the control with the same name, so that a failed run
/// does not reset a slider the user already moved.
pub fn merge(prev: &[Control], next: Vec<Control>) -> Vec<Control> {
    next.into_iter()
        .map(|mut control| {
            if control.current_value.is_none() {
                control.current_value = prev
                    .iter()
                    .find(|p| p.name == control.name)
                    .and_then(|p| p.current_value.clone());
            }
            control
        })
        .collect()
}

/// Apply user-set values to the named controls.
///
/// Names that match no control are ignored. Returns the new controls along
/// with whether any resolved value actually changed.
pub fn apply(controls: &[Control], next_values: &Values) -> (Vec<Control>, bool) {
    let mut changed = false;
    let controls = controls
        .iter()
        .map(|control| {
            let mut control = control.clone();
            if let Some(value) = next_values.get(&control.name) {
                if resolve(&control) != value {
                    changed = true;
                }
                control.current_value = Some(value.clone());
            }
            control
        })
        .collect();
    (controls, changed)
}
