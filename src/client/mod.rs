//! Object access used by the reconcile logic
//!
//! Reads are typed ([`Reader`]). Writes ([`Writer`]) work on
//! [`DynamicObject`]s so that the graph commit can apply heterogeneous
//! objects through one code path. [`KubeClient`] talks to the API server;
//! [`MemoryClient`] keeps objects in process.

mod memory;

pub use memory::{MemoryClient, Operation};

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;

use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::controller::error::{Error, Result};

/// Namespaced resource with a static type, usable with both clients
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Identity of an object across typed and dynamic representations
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn of<K: Object>(namespace: &str, name: &str) -> Self {
        Self::new(&K::api_version(&()), &K::kind(&()), namespace, name)
    }

    pub fn from_object<K: Object>(obj: &K) -> Self {
        Self::of::<K>(&obj.namespace().unwrap_or_default(), &obj.name_any())
    }

    pub fn from_dynamic(resource: &ApiResource, obj: &DynamicObject) -> Self {
        Self::new(
            &resource.api_version,
            &resource.kind,
            &obj.namespace().unwrap_or_default(),
            &obj.name_any(),
        )
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Typed read access
pub trait Reader: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    fn get<K: Object>(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<K>>> + Send;

    /// List objects carrying all of `labels`
    fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<K>>> + Send;
}

/// Dynamic write access
pub trait Writer: Reader {
    fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> impl Future<Output = Result<DynamicObject>> + Send;

    /// Full replace; fails with a conflict on a stale resourceVersion
    fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> impl Future<Output = Result<DynamicObject>> + Send;

    /// JSON merge patch
    fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> impl Future<Output = Result<DynamicObject>> + Send;

    /// JSON merge patch against the status subresource
    fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> impl Future<Output = Result<DynamicObject>> + Send;

    /// Delete; deleting an absent object is not an error
    fn delete(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Convert a typed object into its dynamic form
pub fn to_dynamic<K: Object>(obj: &K) -> Result<(ApiResource, DynamicObject)> {
    let resource = ApiResource::erase::<K>(&());
    let dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    Ok((resource, dynamic))
}

/// Convert a dynamic object back into a typed one
pub fn from_dynamic<K: Object>(obj: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Replace a typed object through a [`Writer`]
pub async fn replace_typed<W: Writer, K: Object>(writer: &W, obj: &K) -> Result<K> {
    let (resource, dynamic) = to_dynamic(obj)?;
    let replaced = writer.replace(&resource, &dynamic).await?;
    from_dynamic(&replaced)
}

/// Render a label map as a selector string
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply an RFC 7386 JSON merge patch in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                apply_merge_patch(entry, value);
            }
        }
    }
}

/// Compute the merge patch turning `orig` into `modified`
pub fn create_merge_patch(orig: &Value, modified: &Value) -> Value {
    match (orig, modified) {
        (Value::Object(orig_map), Value::Object(modified_map)) => {
            let mut patch = serde_json::Map::new();
            for (key, value) in modified_map {
                match orig_map.get(key) {
                    Some(prev) if prev == value => {}
                    Some(prev) => {
                        patch.insert(key.clone(), create_merge_patch(prev, value));
                    }
                    None => {
                        patch.insert(key.clone(), value.clone());
                    }
                }
            }
            for key in orig_map.keys() {
                if !modified_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

impl Reader for KubeClient {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }
}

impl Writer for KubeClient {
    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let namespace = obj
            .metadata
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api = self.dynamic_api(resource, namespace);
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let namespace = obj
            .metadata
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let api = self.dynamic_api(resource, namespace);
        Ok(api.replace(name, &PostParams::default(), obj).await?)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let api = self.dynamic_api(resource, namespace);
        Ok(api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        let api = self.dynamic_api(resource, namespace);
        Ok(api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<()> {
        let api = self.dynamic_api(resource, namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
