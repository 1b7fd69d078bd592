//! The surface exposed to the host: syncing the canvas, adjusting controls and
//! triggering evaluation.

use crate::{
    config::Config,
    controls::{self, ControlsCache, NoCache},
    delta::Delta,
    eval::{Scheduler, Walk},
    exec::Executor,
    graph::{self, Index, Topology},
    node::{self, Record, Values},
    store::{Store, View, Watch},
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, rc::Rc};

/// Keeps node records in step with the canvas.
///
/// All methods take `&self`. Evaluation futures may be interleaved on a single
/// thread. Each node has at most one execution in flight at a time.
pub struct Controller<E, C = NoCache> {
    scheduler: Scheduler<E, C>,
    /// The topology as of the last sync.
    topology: RefCell<Topology>,
}

/// Whether an evaluation pass ran to completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Completion {
    #[default]
    Completed,
    /// A newer pass began before this one finished. Records already
    /// committed by this pass are kept.
    Cancelled,
}

/// A summary of a single [`Controller::sync_graph`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncReport {
    /// What changed since the previous sync.
    pub delta: Delta,
    /// The seeds that were evaluated, in evaluation order.
    pub dirty: Vec<node::Id>,
    pub completion: Completion,
}

impl<E> Controller<E, NoCache>
where
    E: Executor,
{
    /// A controller without a controls cache.
    pub fn new(executor: E) -> Self {
        Self::with_config(executor, NoCache, Config::default())
    }
}

impl<E, C> Controller<E, C>
where
    E: Executor,
    C: ControlsCache,
{
    /// A controller that remembers control values in the given cache.
    pub fn with_cache(executor: E, cache: C) -> Self {
        Self::with_config(executor, cache, Config::default())
    }

    pub fn with_config(executor: E, cache: C, config: Config) -> Self {
        Controller {
            scheduler: Scheduler::new(executor, cache, config),
            topology: RefCell::new(Topology::default()),
        }
    }

    /// The store holding every node's record.
    pub fn store(&self) -> &Store {
        &self.scheduler.store
    }

    pub fn config(&self) -> &Config {
        &self.scheduler.config
    }

    pub fn executor(&self) -> &E {
        &self.scheduler.executor
    }

    pub fn cache(&self) -> &C {
        &self.scheduler.cache
    }

    /// The topology as of the last sync.
    pub fn topology(&self) -> Topology {
        self.topology.borrow().clone()
    }

    /// The adjacency index as of the last sync.
    pub fn index(&self) -> Index {
        self.scheduler.index.borrow().clone()
    }

    /// The record for the given node.
    pub fn get(&self, id: &str) -> Option<Rc<Record>> {
        self.store().get(id)
    }

    /// A point-in-time copy of every node's record.
    pub fn snapshot(&self) -> IndexMap<node::Id, Record> {
        self.store().snapshot()
    }

    /// Shorthand for [`Store::watch`].
    pub fn watch<T, S>(&self, selector: S) -> Watch<T>
    where
        T: PartialEq + 'static,
        S: Fn(View) -> T + 'static,
    {
        self.store().watch(selector)
    }

    /// Shorthand for [`Store::watch_node`].
    pub fn watch_node<T, S>(&self, id: impl Into<node::Id>, selector: S) -> Watch<T>
    where
        T: PartialEq + 'static,
        S: Fn(Option<&Record>) -> T + 'static,
    {
        self.store().watch_node(id, selector)
    }

    /// Bring the records in line with the given topology and re-evaluate
    /// everything the change affects.
    ///
    /// Dirty nodes are the nodes touched by the [`Delta`] plus every node
    /// whose set of sources changed. Each is evaluated along with its
    /// downstream closure.
    pub async fn sync_graph(&self, next: Topology) -> SyncReport {
        let store = self.store();
        let cache = self.cache();
        let delta = Delta::compute(&self.topology.borrow(), &next);

        // Drop records for nodes that are gone.
        let next_ids: IndexSet<&str> = next.nodes.iter().map(|n| n.id.as_str()).collect();
        for id in store.ids() {
            if !next_ids.contains(id.as_str()) {
                log::trace!("removing record for node {id}");
                store.remove(&id);
            }
        }

        // Create new records and refresh existing ones.
        for node in &next.nodes {
            let cached = cache.get(&node.id);
            match store.get(&node.id) {
                None => {
                    let mut record = Record::new(node.code.clone());
                    record.controls = cached.unwrap_or_default();
                    store.set(&node.id, record);
                }
                Some(record) => {
                    let controls = match cached {
                        Some(cached) if cached != record.controls => cached,
                        _ => record.controls.clone(),
                    };
                    if record.code != node.code || controls != record.controls {
                        let record = Record {
                            code: node.code.clone(),
                            controls,
                            ..(*record).clone()
                        };
                        store.set(&node.id, record);
                    }
                }
            }
        }

        let index = graph::build_maps(&next.edges);
        let rewired = self.scheduler.index.borrow().rewired_targets(&index);
        if !delta.edges_added.is_empty() || !delta.edges_removed.is_empty() {
            let cyclic = index.cyclic_nodes();
            if !cyclic.is_empty() {
                log::warn!("nodes form a cycle: {cyclic:?}");
            }
        }
        *self.scheduler.index.borrow_mut() = index;
        *self.topology.borrow_mut() = next;

        let dirty: IndexSet<node::Id> = delta.affected.iter().cloned().chain(rewired).collect();
        let dirty: Vec<node::Id> = dirty.into_iter().collect();
        log::debug!(
            "sync: nodes +{} -{} ~{}, edges +{} -{}, {} dirty",
            delta.nodes_added.len(),
            delta.nodes_removed.len(),
            delta.nodes_updated.len(),
            delta.edges_added.len(),
            delta.edges_removed.len(),
            dirty.len(),
        );

        let completion = if dirty.is_empty() {
            Completion::Completed
        } else {
            let pass = self.scheduler.begin_pass();
            walk_completion(self.scheduler.run(dirty.clone(), &pass).await)
        };
        SyncReport {
            delta,
            dirty,
            completion,
        }
    }

    /// Apply user-set values to a node's controls.
    ///
    /// The node and its downstream closure are only re-evaluated if at least
    /// one resolved value actually changed. The controls are persisted to the
    /// cache either way.
    pub async fn update_node_controls(&self, id: &str, next_values: &Values) -> Completion {
        let Some(record) = self.store().get(id) else {
            log::trace!("ignoring control update for unknown node {id}");
            return Completion::Completed;
        };
        let (controls, changed) = controls::apply(&record.controls, next_values);
        self.cache()
            .set(id, (!controls.is_empty()).then(|| controls.clone()));
        if !changed {
            return Completion::Completed;
        }
        let record = Record {
            controls,
            ..(*record).clone()
        };
        self.store().set(id, record);
        self.evaluate_node(id).await
    }

    /// Evaluate the given node and its downstream closure.
    pub async fn evaluate_node(&self, id: &str) -> Completion {
        let pass = self.scheduler.begin_pass();
        let mut visited = IndexSet::new();
        walk_completion(self.scheduler.walk(id, &mut visited, &pass).await)
    }

    /// Evaluate every node exactly once.
    pub async fn evaluate_all(&self) -> Completion {
        let pass = self.scheduler.begin_pass();
        let mut visited = IndexSet::new();
        for id in self.store().ids() {
            match self.scheduler.walk(&id, &mut visited, &pass).await {
                Walk::Completed => (),
                walk => return walk_completion(walk),
            }
        }
        Completion::Completed
    }
}

// An adopted walk finished on behalf of a newer pass, not its own.
fn walk_completion(walk: Walk) -> Completion {
    match walk {
        Walk::Completed => Completion::Completed,
        Walk::Cancelled | Walk::Adopted => Completion::Cancelled,
    }
}
