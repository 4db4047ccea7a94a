use super::dag::{Dag, ObjectAction, ObjectVertex};
use crate::client::{Object, ObjectKey, to_dynamic};
use crate::controller::error::Result;

/// Stages typed object mutations into a [`Dag`]
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphClient;

impl GraphClient {
    pub fn new() -> Self {
        Self
    }

    pub fn create<K: Object>(&self, dag: &mut Dag, obj: &K) -> Result<usize> {
        self.stage(dag, None, obj, ObjectAction::Create)
    }

    /// Replace `orig` with `obj`; conflicts if `orig` is stale at commit time
    pub fn update<K: Object>(&self, dag: &mut Dag, orig: &K, obj: &K) -> Result<usize> {
        self.stage(dag, Some(orig), obj, ObjectAction::Update)
    }

    /// Merge patch from `orig` to `obj`
    pub fn patch<K: Object>(&self, dag: &mut Dag, orig: &K, obj: &K) -> Result<usize> {
        self.stage(dag, Some(orig), obj, ObjectAction::Patch)
    }

    pub fn delete<K: Object>(&self, dag: &mut Dag, obj: &K) -> Result<usize> {
        self.stage(dag, None, obj, ObjectAction::Delete)
    }

    /// Status subresource change from `orig` to `obj`
    pub fn status<K: Object>(&self, dag: &mut Dag, orig: &K, obj: &K) -> Result<usize> {
        self.stage(dag, Some(orig), obj, ObjectAction::Status)
    }

    /// Make the vertex `from` commit after `to`
    pub fn depends_on(&self, dag: &mut Dag, from: usize, to: usize) {
        dag.connect(from, to);
    }

    fn stage<K: Object>(
        &self,
        dag: &mut Dag,
        orig: Option<&K>,
        obj: &K,
        action: ObjectAction,
    ) -> Result<usize> {
        let (resource, dynamic) = to_dynamic(obj)?;
        let orig = match orig {
            Some(o) => Some(to_dynamic(o)?.1),
            None => None,
        };
        Ok(dag.add(ObjectVertex {
            key: ObjectKey::from_object(obj),
            resource,
            obj: dynamic,
            orig,
            action,
        }))
    }
}
