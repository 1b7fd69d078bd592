//! The per-node record store and its fine-grained subscriptions.
//!
//! Each node's [`Record`] lives at its own address. A [`Watch`] either reads a
//! single node ([`Store::watch_node`]) and is only re-evaluated when that node
//! changes, or reads a [`View`] of every node ([`Store::watch`]) and is
//! re-evaluated on any change. Either way the watcher is only notified when
//! the value it derives actually changes.

use crate::node::{self, Record};
use indexmap::IndexMap;
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
};

/// The shared, single-threaded store of node records.
///
/// Cloning a `Store` produces another handle to the same records.
#[derive(Clone, Default)]
pub struct Store {
    shared: Rc<Shared>,
}

/// A read-only view over every record in the store.
#[derive(Clone, Copy)]
pub struct View<'a> {
    records: &'a IndexMap<node::Id, Rc<Record>>,
}

/// A subscription to a value derived from the store.
///
/// Dropping the `Watch` unsubscribes.
pub struct Watch<T> {
    state: Rc<RefCell<WatchState<T>>>,
    key: u64,
    store: Weak<Shared>,
}

#[derive(Default)]
struct Shared {
    records: RefCell<IndexMap<node::Id, Rc<Record>>>,
    watchers: RefCell<BTreeMap<u64, Watcher>>,
    next_key: Cell<u64>,
}

/// A registered watcher. The `update` fn re-derives its value and notifies on
/// change.
struct Watcher {
    scope: Scope,
    update: Rc<RefCell<dyn FnMut(&Store)>>,
    /// Set when a change arrives while `update` is already running.
    pending: Rc<Cell<bool>>,
}

/// Which changes a watcher must be re-evaluated for.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Scope {
    Node(node::Id),
    All,
}

struct WatchState<T> {
    value: T,
    version: u64,
    on_change: Option<Box<dyn FnMut(&T)>>,
}

impl Store {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for the given node.
    pub fn get(&self, id: &str) -> Option<Rc<Record>> {
        self.shared.records.borrow().get(id).cloned()
    }

    /// Whether a record exists for the given node.
    pub fn contains(&self, id: &str) -> bool {
        self.shared.records.borrow().contains_key(id)
    }

    /// Replace the record for the given node, notifying watchers.
    pub fn set(&self, id: &str, record: Record) {
        {
            let mut records = self.shared.records.borrow_mut();
            match records.get_mut(id) {
                Some(slot) => *slot = Rc::new(record),
                None => {
                    records.insert(id.to_string(), Rc::new(record));
                }
            }
        }
        self.notify(id);
    }

    /// Replace the record for the given node with a modified copy.
    ///
    /// Does nothing and returns `false` if the node has no record.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut Record)) -> bool {
        let Some(current) = self.get(id) else {
            return false;
        };
        let mut record = (*current).clone();
        f(&mut record);
        self.set(id, record);
        true
    }

    /// Remove the record for the given node, notifying watchers.
    pub fn remove(&self, id: &str) -> Option<Rc<Record>> {
        let removed = self.shared.records.borrow_mut().shift_remove(id);
        if removed.is_some() {
            self.notify(id);
        }
        removed
    }

    /// The IDs of all nodes with a record, in insertion order.
    pub fn ids(&self) -> Vec<node::Id> {
        self.shared.records.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.records.borrow().is_empty()
    }

    /// A point-in-time copy of every record.
    pub fn snapshot(&self) -> IndexMap<node::Id, Record> {
        self.shared
            .records
            .borrow()
            .iter()
            .map(|(id, r)| (id.clone(), (**r).clone()))
            .collect()
    }

    /// Read every record through the given function.
    pub fn read<T>(&self, f: impl FnOnce(View) -> T) -> T {
        let records = self.shared.records.borrow();
        f(View { records: &*records })
    }

    /// Watch a value derived from all records.
    ///
    /// The selector is re-run after every change to any record, but the
    /// watch is only notified when its result differs from the last one.
    pub fn watch<T, S>(&self, selector: S) -> Watch<T>
    where
        T: PartialEq + 'static,
        S: Fn(View) -> T + 'static,
    {
        let value = self.read(&selector);
        self.register(Scope::All, value, move |store| store.read(&selector))
    }

    /// Watch a value derived from a single node's record.
    ///
    /// Changes to other nodes never re-run the selector. The selector receives
    /// `None` while the node has no record.
    pub fn watch_node<T, S>(&self, id: impl Into<node::Id>, selector: S) -> Watch<T>
    where
        T: PartialEq + 'static,
        S: Fn(Option<&Record>) -> T + 'static,
    {
        let id = id.into();
        let value = selector(self.get(&id).as_deref());
        let scope = Scope::Node(id.clone());
        self.register(scope, value, move |store| selector(store.get(&id).as_deref()))
    }

    fn register<T, F>(&self, scope: Scope, value: T, derive: F) -> Watch<T>
    where
        T: PartialEq + 'static,
        F: Fn(&Store) -> T + 'static,
    {
        let state = Rc::new(RefCell::new(WatchState {
            value,
            version: 0,
            on_change: None,
        }));
        let weak_state = Rc::downgrade(&state);
        let update = move |store: &Store| {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            let next = derive(store);
            let mut state = state.borrow_mut();
            if state.value == next {
                return;
            }
            state.value = next;
            state.version += 1;
            let WatchState {
                value, on_change, ..
            } = &mut *state;
            if let Some(f) = on_change {
                f(value);
            }
        };
        let key = self.shared.next_key.get();
        self.shared.next_key.set(key + 1);
        let watcher = Watcher {
            scope,
            update: Rc::new(RefCell::new(update)),
            pending: Rc::new(Cell::new(false)),
        };
        self.shared.watchers.borrow_mut().insert(key, watcher);
        Watch {
            state,
            key,
            store: Rc::downgrade(&self.shared),
        }
    }

    fn notify(&self, id: &str) {
        let watchers: Vec<_> = self
            .shared
            .watchers
            .borrow()
            .values()
            .filter(|w| w.scope.covers(id))
            .map(|w| (w.update.clone(), w.pending.clone()))
            .collect();
        for (update, pending) in watchers {
            // A watcher whose callback writes back into the store is already
            // borrowed further up the stack. It re-runs once the callback returns.
            let Ok(mut update) = update.try_borrow_mut() else {
                pending.set(true);
                continue;
            };
            (*update)(self);
            while pending.replace(false) {
                (*update)(self);
            }
        }
    }
}

impl<'a> View<'a> {
    /// The record for the given node.
    pub fn get(&self, id: &str) -> Option<&'a Record> {
        self.records.get(id).map(|r| &**r)
    }

    /// The IDs of every node with a record.
    pub fn ids(&self) -> impl Iterator<Item = &'a node::Id> + use<'a> {
        self.records.keys()
    }

    /// Every record alongside its node ID.
    pub fn iter(&self) -> impl Iterator<Item = (&'a node::Id, &'a Record)> + use<'a> {
        self.records.iter().map(|(id, r)| (id, &**r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> Watch<T> {
    /// The number of times the watched value has changed.
    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow().value)
    }

    /// Call `f` with the new value every time it changes.
    ///
    /// `f` must not read from this same `Watch`. It may write to the store, in
    /// which case this watch is re-evaluated once `f` returns.
    pub fn on_change(self, f: impl FnMut(&T) + 'static) -> Self {
        self.state.borrow_mut().on_change = Some(Box::new(f));
        self
    }
}

impl<T: Clone> Watch<T> {
    /// The current value.
    pub fn get(&self) -> T {
        self.state.borrow().value.clone()
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.store.upgrade() {
            if let Ok(mut watchers) = shared.watchers.try_borrow_mut() {
                watchers.remove(&self.key);
            }
        }
    }
}

impl Scope {
    fn covers(&self, id: &str) -> bool {
        match self {
            Scope::Node(node) => node == id,
            Scope::All => true,
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.shared.records.borrow())
            .field("watchers", &self.shared.watchers.borrow().len())
            .finish()
    }
}

impl<T: fmt::Debug> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Watch")
            .field("value", &state.value)
            .field("version", &state.version)
            .finish()
    }
}

impl fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
