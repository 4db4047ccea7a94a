use std::collections::BTreeSet;

use kube::api::{ApiResource, DynamicObject};
use serde_json::Value;
use tracing::debug;

use crate::client::{Object, ObjectKey, Writer, create_merge_patch, from_dynamic};
use crate::controller::error::{Error, Result};

/// Intended mutation of a vertex
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectAction {
    Create,
    /// Full replace guarded by the resourceVersion read with the object
    Update,
    /// Merge patch computed from the original object
    Patch,
    Delete,
    /// Merge patch of the status subresource
    Status,
}

impl ObjectAction {
    fn rank(self) -> u8 {
        match self {
            ObjectAction::Patch => 0,
            ObjectAction::Update => 1,
            ObjectAction::Create => 2,
            ObjectAction::Delete => 3,
            ObjectAction::Status => 0,
        }
    }
}

impl std::fmt::Display for ObjectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectAction::Create => write!(f, "create"),
            ObjectAction::Update => write!(f, "update"),
            ObjectAction::Patch => write!(f, "patch"),
            ObjectAction::Delete => write!(f, "delete"),
            ObjectAction::Status => write!(f, "status"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ObjectVertex {
    pub key: ObjectKey,
    pub resource: ApiResource,
    pub obj: DynamicObject,
    /// Object as read before this reconcile pass touched it
    pub orig: Option<DynamicObject>,
    pub action: ObjectAction,
}

impl ObjectVertex {
    fn is_status(&self) -> bool {
        self.action == ObjectAction::Status
    }
}

/// Staged object mutations of one reconcile pass.
///
/// A vertex is identified by its object key plus whether it targets the
/// status subresource. Registering the same identity twice merges into the
/// existing vertex: the newest object wins, the first original is kept and the
/// stronger action survives (delete > create > update > patch).
#[derive(Clone, Debug, Default)]
pub struct Dag {
    vertices: Vec<ObjectVertex>,
    /// `(from, to)`: `from` is committed after `to`
    edges: Vec<(usize, usize)>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &ObjectVertex> {
        self.vertices.iter()
    }

    pub fn vertex(&self, index: usize) -> Option<&ObjectVertex> {
        self.vertices.get(index)
    }

    /// Add a vertex, merging it into an existing one with the same identity
    pub fn add(&mut self, vertex: ObjectVertex) -> usize {
        if let Some(index) = self.index_of(&vertex.key, vertex.is_status()) {
            let existing = &mut self.vertices[index];
            if vertex.action.rank() > existing.action.rank() {
                existing.action = vertex.action;
            }
            if existing.orig.is_none() {
                existing.orig = vertex.orig;
            }
            existing.obj = vertex.obj;
            debug!(object = %existing.key, action = %existing.action, "merged staged object");
            return index;
        }
        debug!(object = %vertex.key, action = %vertex.action, "staged object");
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn index_of(&self, key: &ObjectKey, status: bool) -> Option<usize> {
        self.vertices
            .iter()
            .position(|v| &v.key == key && v.is_status() == status)
    }

    pub fn find(&self, key: &ObjectKey, status: bool) -> Option<&ObjectVertex> {
        self.index_of(key, status).map(|i| &self.vertices[i])
    }

    /// Typed view of the staged (non-status) object, if any
    pub fn find_typed<K: Object>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<(K, ObjectAction)>> {
        let key = ObjectKey::of::<K>(namespace, name);
        match self.find(&key, false) {
            Some(v) => Ok(Some((from_dynamic(&v.obj)?, v.action))),
            None => Ok(None),
        }
    }

    /// Make `from` commit after `to`
    pub fn connect(&mut self, from: usize, to: usize) {
        if from != to && !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    /// Dependency order, ties broken by insertion order
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let n = self.vertices.len();
        let mut pending = vec![0usize; n];
        for &(from, to) in &self.edges {
            if from >= n || to >= n {
                return Err(Error::InvalidConfig(format!(
                    "edge {from} -> {to} references an unknown vertex"
                )));
            }
            pending[from] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &(from, to) in &self.edges {
                if to == next {
                    pending[from] -= 1;
                    if pending[from] == 0 {
                        ready.insert(from);
                    }
                }
            }
        }

        if order.len() != n {
            return Err(Error::InvalidConfig(
                "cycle detected between staged objects".to_string(),
            ));
        }
        Ok(order)
    }

    /// Apply every staged mutation. Stops at the first failing write.
    pub async fn commit<W: Writer>(&self, writer: &W) -> Result<()> {
        for index in self.topological_order()? {
            let vertex = &self.vertices[index];
            commit_vertex(writer, vertex).await?;
        }
        Ok(())
    }
}

async fn commit_vertex<W: Writer>(writer: &W, vertex: &ObjectVertex) -> Result<()> {
    let namespace = vertex.key.namespace.as_str();
    let name = vertex.key.name.as_str();
    match vertex.action {
        ObjectAction::Create => {
            writer.create(&vertex.resource, &vertex.obj).await?;
        }
        ObjectAction::Update => {
            writer.replace(&vertex.resource, &vertex.obj).await?;
        }
        ObjectAction::Patch => {
            let mut patch = diff(vertex)?;
            if let Value::Object(map) = &mut patch {
                map.remove("status");
            }
            if is_empty_patch(&patch) {
                debug!(object = %vertex.key, "patch is empty, skipped");
                return Ok(());
            }
            writer.patch(&vertex.resource, namespace, name, &patch).await?;
        }
        ObjectAction::Delete => {
            writer.delete(&vertex.resource, namespace, name).await?;
        }
        ObjectAction::Status => {
            let patch = diff(vertex)?;
            let status = patch.get("status").cloned().unwrap_or(Value::Null);
            if is_empty_patch(&status) {
                debug!(object = %vertex.key, "status unchanged, skipped");
                return Ok(());
            }
            let patch = serde_json::json!({ "status": status });
            writer
                .patch_status(&vertex.resource, namespace, name, &patch)
                .await?;
        }
    }
    debug!(object = %vertex.key, action = %vertex.action, "committed");
    Ok(())
}

fn diff(vertex: &ObjectVertex) -> Result<Value> {
    let modified = serde_json::to_value(&vertex.obj)?;
    Ok(match &vertex.orig {
        Some(orig) => create_merge_patch(&serde_json::to_value(orig)?, &modified),
        None => modified,
    })
}

fn is_empty_patch(patch: &Value) -> bool {
    match patch {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
