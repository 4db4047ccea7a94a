use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use kube::api::{ApiResource, DynamicObject};
use serde_json::{Value, json};

use super::{Object, ObjectKey, Reader, Writer, apply_merge_patch};
use crate::controller::error::{Error, Result};

/// Write recorded by [`MemoryClient`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Create(ObjectKey),
    Replace(ObjectKey),
    Patch(ObjectKey),
    PatchStatus(ObjectKey),
    Delete(ObjectKey),
}

impl Operation {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Operation::Create(k)
            | Operation::Replace(k)
            | Operation::Patch(k)
            | Operation::PatchStatus(k)
            | Operation::Delete(k) => k,
        }
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    operations: Vec<Operation>,
}

/// In-process object store implementing [`Reader`] and [`Writer`].
///
/// Every write bumps a global resourceVersion. `replace` rejects a stale
/// resourceVersion with a conflict, and `status` is only writable through
/// `patch_status`, as with a status subresource.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<State>>,
    version: Arc<AtomicU64>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Store an object as-is, filling uid and resourceVersion
    pub fn insert<K: Object>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let mut value = serde_json::to_value(obj)?;
        self.stamp(&mut value, &key);
        let stored = serde_json::from_value(value.clone())?;
        self.lock().objects.insert(key, value);
        Ok(stored)
    }

    /// Synchronous typed lookup
    pub fn object<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = ObjectKey::of::<K>(namespace, name);
        let value = self.lock().objects.get(&key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// Writes performed so far, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    fn stamp(&self, value: &mut Value, key: &ObjectKey) {
        let version = self.next_version();
        if value.get("metadata").is_none() {
            value["metadata"] = json!({});
        }
        let metadata = &mut value["metadata"];
        metadata["resourceVersion"] = json!(version);
        if metadata.get("uid").is_none_or(Value::is_null) {
            metadata["uid"] = json!(format!("uid-{}-{}", key.name, version));
        }
    }

    fn resource_key(resource: &ApiResource, namespace: &str, name: &str) -> ObjectKey {
        ObjectKey::new(&resource.api_version, &resource.kind, namespace, name)
    }
}

fn labels_match(value: &Value, labels: &BTreeMap<String, String>) -> bool {
    let actual = &value["metadata"]["labels"];
    labels
        .iter()
        .all(|(k, v)| actual.get(k).and_then(Value::as_str) == Some(v.as_str()))
}

impl Reader for MemoryClient {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let key = ObjectKey::of::<K>(namespace, name);
        let value = self.lock().objects.get(&key).cloned();
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        let values: Vec<Value> = self
            .lock()
            .objects
            .iter()
            .filter(|(k, v)| {
                k.api_version == api_version
                    && k.kind == kind
                    && k.namespace == namespace
                    && labels_match(v, labels)
            })
            .map(|(_, v)| v.clone())
            .collect();
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }
}

impl Writer for MemoryClient {
    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_dynamic(resource, obj);
        let mut value = serde_json::to_value(obj)?;
        self.stamp(&mut value, &key);
        let mut state = self.lock();
        if state.objects.contains_key(&key) {
            return Err(Error::ConflictError(format!("{key} already exists")));
        }
        state.objects.insert(key.clone(), value.clone());
        state.operations.push(Operation::Create(key));
        Ok(serde_json::from_value(value)?)
    }

    async fn replace(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_dynamic(resource, obj);
        let mut value = serde_json::to_value(obj)?;
        let mut state = self.lock();
        let Some(current) = state.objects.get(&key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        let current_version = current["metadata"]["resourceVersion"].clone();
        let requested_version = &value["metadata"]["resourceVersion"];
        if !requested_version.is_null() && *requested_version != current_version {
            return Err(Error::ConflictError(format!(
                "{key}: resourceVersion {requested_version} is stale"
            )));
        }
        let status = current.get("status").cloned();
        value["metadata"]["uid"] = current["metadata"]["uid"].clone();
        match status {
            Some(status) => value["status"] = status,
            None => {
                if let Value::Object(map) = &mut value {
                    map.remove("status");
                }
            }
        }
        value["metadata"]["resourceVersion"] = json!(self.next_version());
        state.objects.insert(key.clone(), value.clone());
        state.operations.push(Operation::Replace(key));
        Ok(serde_json::from_value(value)?)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let key = Self::resource_key(resource, namespace, name);
        let mut patch = patch.clone();
        if let Value::Object(map) = &mut patch {
            map.remove("status");
        }
        let version = self.next_version();
        let mut state = self.lock();
        let Some(current) = state.objects.get_mut(&key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        apply_merge_patch(current, &patch);
        current["metadata"]["resourceVersion"] = json!(version);
        let value = current.clone();
        state.operations.push(Operation::Patch(key));
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let key = Self::resource_key(resource, namespace, name);
        let status_patch = json!({ "status": patch.get("status").cloned().unwrap_or(Value::Null) });
        let version = self.next_version();
        let mut state = self.lock();
        let Some(current) = state.objects.get_mut(&key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        apply_merge_patch(current, &status_patch);
        current["metadata"]["resourceVersion"] = json!(version);
        let value = current.clone();
        state.operations.push(Operation::PatchStatus(key));
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<()> {
        let key = Self::resource_key(resource, namespace, name);
        let mut state = self.lock();
        if state.objects.remove(&key).is_some() {
            state.operations.push(Operation::Delete(key));
        }
        Ok(())
    }
}
