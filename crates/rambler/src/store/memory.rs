//! In-memory store
//!
//! Holds a whole composition in maps behind one mutex. Structural edits are
//! published on per-node watch channels and parameter edits on a single
//! broadcast channel, so players react to live mutation the same way they
//! would against a remote store.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::{ParameterChange, ParameterSubscription, PartsWatch, Store};
use crate::error::StoreError;
use crate::vocab::{CombinatorKind, NodeId, ParamKind, ParamValue, Relation};

const PARAMETER_CHANNEL_CAPACITY: usize = 256;

struct NodeRecord {
    parts: Vec<NodeId>,
    parts_tx: watch::Sender<Vec<NodeId>>,
    combinator: Option<String>,
    params: HashMap<ParamKind, ParamValue>,
    similars: Vec<NodeId>,
    successors: Vec<NodeId>,
    source_path: Option<String>,
}

impl NodeRecord {
    fn new() -> Self {
        let (parts_tx, _) = watch::channel(Vec::new());
        Self {
            parts: Vec::new(),
            parts_tx,
            combinator: None,
            params: HashMap::new(),
            similars: Vec::new(),
            successors: Vec::new(),
            source_path: None,
        }
    }

    fn publish_parts(&self) {
        self.parts_tx.send_replace(self.parts.clone());
    }
}

#[derive(Default)]
struct TypeRecord {
    base: Option<String>,
    param: Option<String>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<NodeId, NodeRecord>,
    types: HashMap<String, TypeRecord>,
    objects: HashMap<String, ParamValue>,
    globals: HashMap<ParamKind, ParamValue>,
}

impl Inner {
    fn node(&self, id: &NodeId) -> Result<&NodeRecord, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    fn ensure(&mut self, id: &NodeId) -> &mut NodeRecord {
        self.nodes.entry(id.clone()).or_insert_with(NodeRecord::new)
    }

    fn parents_of<'a>(&'a self, child: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.nodes
            .iter()
            .filter(move |(_, record)| record.parts.contains(child))
            .map(|(id, _)| id)
    }
}

/// Store keeping the whole composition in memory.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    params_tx: broadcast::Sender<ParameterChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (params_tx, _) = broadcast::channel(PARAMETER_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            params_tx,
        }
    }

    /// Add a node, appending it to `parent`'s parts when given.
    pub fn add_node(&self, id: &str, parent: Option<&str>) {
        let id = NodeId::from(id);
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(&id);
        if let Some(parent) = parent {
            let parent = inner.ensure(&NodeId::from(parent));
            parent.parts.push(id);
            parent.publish_parts();
        }
    }

    /// Add a node with an audio source path.
    pub fn add_leaf(&self, id: &str, parent: Option<&str>, source_path: &str) {
        self.add_node(id, parent);
        self.set_source_path(id, source_path);
    }

    /// Append `child` to `parent`'s parts, creating either if needed.
    pub fn add_part(&self, parent: &str, child: &str) {
        let child = NodeId::from(child);
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(&child);
        let parent = inner.ensure(&NodeId::from(parent));
        parent.parts.push(child);
        parent.publish_parts();
    }

    /// Replace `parent`'s parts wholesale.
    pub fn set_parts(&self, parent: &str, parts: &[&str]) {
        let parts: Vec<NodeId> = parts.iter().map(|p| NodeId::from(*p)).collect();
        let mut inner = self.inner.lock().unwrap();
        for part in &parts {
            inner.ensure(part);
        }
        let parent = inner.ensure(&NodeId::from(parent));
        parent.parts = parts;
        parent.publish_parts();
    }

    /// Remove the first occurrence of `child` from `parent`'s parts.
    pub fn remove_part(&self, parent: &str, child: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.nodes.get_mut(&NodeId::from(parent)) else {
            return false;
        };
        let Some(index) = record.parts.iter().position(|p| p.as_str() == child) else {
            return false;
        };
        record.parts.remove(index);
        record.publish_parts();
        true
    }

    /// Declare a combinator type id, optionally specializing a base tag and
    /// carrying a parameter value.
    pub fn declare_type(&self, type_id: &str, base: Option<&str>, param: Option<ParamValue>) {
        let mut inner = self.inner.lock().unwrap();
        let param = param.map(|value| {
            let object = format!("{type_id}/param");
            inner.objects.insert(object.clone(), value);
            object
        });
        inner.types.insert(
            type_id.to_string(),
            TypeRecord {
                base: base.map(str::to_string),
                param,
            },
        );
    }

    /// Point a node at a combinator type id (a tag or a declared type).
    pub fn set_combinator_type(&self, node: &str, type_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(&NodeId::from(node)).combinator = Some(type_id.to_string());
    }

    /// Set a node's combinator. With a parameter, a node-specific subtype of
    /// the combinator is declared to carry it.
    pub fn set_combinator(&self, node: &str, kind: CombinatorKind, param: Option<ParamValue>) {
        match param {
            None => self.set_combinator_type(node, kind.tag()),
            Some(value) => {
                let type_id = format!("{node}/{}", kind.tag());
                self.declare_type(&type_id, Some(kind.tag()), Some(value));
                self.set_combinator_type(node, &type_id);
            }
        }
    }

    /// Set a parameter and notify observers. `owner = None` sets a global.
    pub fn set_parameter(&self, owner: Option<&str>, kind: ParamKind, value: impl Into<ParamValue>) {
        let owner = owner.map(NodeId::from);
        let value = value.into();
        {
            let mut inner = self.inner.lock().unwrap();
            match &owner {
                Some(id) => {
                    inner.ensure(id).params.insert(kind, value.clone());
                }
                None => {
                    inner.globals.insert(kind, value.clone());
                }
            }
        }
        // No receivers is fine
        let _ = self.params_tx.send(ParameterChange { owner, kind, value });
    }

    pub fn global_parameter(&self, kind: ParamKind) -> Option<ParamValue> {
        self.inner.lock().unwrap().globals.get(&kind).cloned()
    }

    pub fn add_similar(&self, node: &str, similar: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(&NodeId::from(node)).similars.push(NodeId::from(similar));
    }

    pub fn add_successor(&self, node: &str, successor: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .ensure(&NodeId::from(node))
            .successors
            .push(NodeId::from(successor));
    }

    pub fn set_source_path(&self, node: &str, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure(&NodeId::from(node)).source_path = Some(path.to_string());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_parts(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.parts.clone())
    }

    fn watch_parts(&self, node: &NodeId) -> Result<PartsWatch, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.parts_tx.subscribe())
    }

    async fn find_parameter_value(
        &self,
        node: &NodeId,
        kind: ParamKind,
    ) -> Result<Option<ParamValue>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.params.get(&kind).cloned())
    }

    async fn find_object(
        &self,
        subject: &str,
        relation: Relation,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        match relation {
            Relation::CombinatorType => Ok(inner.node(&NodeId::from(subject))?.combinator.clone()),
            Relation::BaseType => Ok(inner.types.get(subject).and_then(|t| t.base.clone())),
            Relation::TypeParameter => Ok(inner.types.get(subject).and_then(|t| t.param.clone())),
        }
    }

    async fn find_object_value(&self, object: &str) -> Result<Option<ParamValue>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.objects.get(object).cloned())
    }

    fn observe_parameter(&self, owner: Option<&NodeId>, kind: ParamKind) -> ParameterSubscription {
        ParameterSubscription::new(self.params_tx.subscribe(), owner.cloned(), kind)
    }

    async fn find_all_parents(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.node(node)?;

        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            for parent in inner.parents_of(current) {
                if parent == node {
                    return Err(StoreError::Cycle(node.clone()));
                }
                if seen.insert(parent) {
                    ancestors.push(parent.clone());
                    queue.push_back(parent);
                }
            }
        }
        Ok(ancestors)
    }

    async fn find_similars(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.similars.clone())
    }

    async fn find_successors(&self, node: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.successors.clone())
    }

    async fn find_source_path(&self, node: &NodeId) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(node)?.source_path.clone())
    }
}
