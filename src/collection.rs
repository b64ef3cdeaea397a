//! Cached collection of resource instances and its synchronizer
//!
//! [`Collection`] is the in-memory list behind one admin card. It is keyed by
//! a [`KeyField`] and never holds two instances with the same key.
//! [`CollectionSync`] is the only writer: it performs requests through a
//! [`ResourceApi`] and reconciles the list with the responses.

use clubs_rust_rest::{
    InstanceKey, KeyField, RequestBody, ResourceApi, ResourceClient, ResourceInstance, RestError,
};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::Error;

/// Kind of a confirmed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Fields an optimistic update overwrote, for undoing them one by one
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch {
    key: InstanceKey,
    /// (field, value before, value written)
    fields: Vec<(String, Option<Value>, Value)>,
}

impl PendingPatch {
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Ordered instances of one resource, unique by key
#[derive(Debug, Clone)]
pub struct Collection {
    key_field: KeyField,
    items: Vec<ResourceInstance>,
}

impl Collection {
    pub fn new(key_field: KeyField) -> Self {
        Self {
            key_field,
            items: Vec::new(),
        }
    }

    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    pub fn items(&self) -> &[ResourceInstance] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceInstance> {
        self.items.iter()
    }

    pub fn key_of(&self, instance: &ResourceInstance) -> Option<InstanceKey> {
        instance.key(&self.key_field)
    }

    pub fn position(&self, key: &InstanceKey) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.key(&self.key_field).as_ref() == Some(key))
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&ResourceInstance> {
        self.position(key).map(|index| &self.items[index])
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.position(key).is_some()
    }

    /// Replace every instance. When the new list repeats a key, the later
    /// instance wins and takes the position of the first.
    pub fn replace_all(&mut self, items: Vec<ResourceInstance>) {
        let mut positions: HashMap<InstanceKey, usize> = HashMap::new();
        let mut deduped: Vec<ResourceInstance> = Vec::with_capacity(items.len());

        for item in items {
            match item.key(&self.key_field) {
                Some(key) => match positions.get(&key) {
                    Some(&index) => {
                        debug!("Duplicate {} {} in list response", self.key_field, key);
                        deduped[index] = item;
                    }
                    None => {
                        positions.insert(key, deduped.len());
                        deduped.push(item);
                    }
                },
                None => {
                    warn!("Instance without a {} key in list response", self.key_field);
                    deduped.push(item);
                }
            }
        }
        self.items = deduped;
    }

    /// Replace the instance with the same key, or append it
    pub fn upsert(&mut self, instance: ResourceInstance) {
        match self.key_of(&instance).and_then(|key| self.position(&key)) {
            Some(index) => self.items[index] = instance,
            None => self.items.push(instance),
        }
    }

    /// Merge fields into the instance with the same key, or append it
    pub fn merge(&mut self, instance: &ResourceInstance) {
        match self.key_of(instance).and_then(|key| self.position(&key)) {
            Some(index) => self.items[index].merge(instance),
            None => self.items.push(instance.clone()),
        }
    }

    /// Merge a server response into the instance stored under `key`.
    ///
    /// The response may carry a new key; any other instance holding that new
    /// key is dropped.
    pub fn merge_at(&mut self, key: &InstanceKey, instance: &ResourceInstance) {
        let Some(index) = self.position(key) else {
            self.merge(instance);
            return;
        };
        self.items[index].merge(instance);

        if let Some(new_key) = self.items[index].key(&self.key_field) {
            if &new_key != key {
                let key_field = &self.key_field;
                let mut current = 0;
                self.items.retain(|item| {
                    let keep = current == index || item.key(key_field).as_ref() != Some(&new_key);
                    current += 1;
                    keep
                });
            }
        }
    }

    /// Remove the instance with `key`, returning it with its former position
    pub fn remove(&mut self, key: &InstanceKey) -> Option<(usize, ResourceInstance)> {
        let index = self.position(key)?;
        Some((index, self.items.remove(index)))
    }

    /// Put an instance back at `index` (clamped). Ignored when its key is
    /// already present again.
    pub fn insert_at(&mut self, index: usize, instance: ResourceInstance) {
        if let Some(key) = self.key_of(&instance) {
            if self.contains(&key) {
                return;
            }
        }
        let index = index.min(self.items.len());
        self.items.insert(index, instance);
    }

    /// Write `fields` into the instance under `key`, leaving its key field
    /// alone. Returns what was overwritten, or `None` when `key` is absent.
    pub fn apply_patch(
        &mut self,
        key: &InstanceKey,
        fields: &Map<String, Value>,
    ) -> Option<PendingPatch> {
        let index = self.position(key)?;
        let root = self.key_field.root().to_string();
        let item = &mut self.items[index];

        let mut overwritten = Vec::new();
        for (field, value) in fields {
            if *field == root {
                continue;
            }
            let before = item.get(field).cloned();
            item.set(field, value.clone());
            overwritten.push((field.clone(), before, value.clone()));
        }
        Some(PendingPatch {
            key: key.clone(),
            fields: overwritten,
        })
    }

    /// Undo a patch field by field. A field is only restored while it still
    /// holds the patched value; anything written since is kept. Returns the
    /// number of fields restored.
    pub fn revert_patch(&mut self, patch: PendingPatch) -> usize {
        let Some(index) = self.position(&patch.key) else {
            return 0;
        };
        let item = &mut self.items[index];

        let mut restored = 0;
        for (field, before, written) in patch.fields {
            if item.get(&field) != Some(&written) {
                continue;
            }
            match before {
                Some(value) => item.set(&field, value),
                None => {
                    item.remove(&field);
                }
            }
            restored += 1;
        }
        restored
    }

    /// Local reconciliation after a confirmed mutation. Returns false when
    /// nothing changed.
    pub fn apply(&mut self, kind: MutationKind, instance: &ResourceInstance) -> bool {
        match kind {
            MutationKind::Create => {
                self.upsert(instance.clone());
                true
            }
            MutationKind::Update => {
                self.merge(instance);
                true
            }
            MutationKind::Delete => match self.key_of(instance) {
                Some(key) => self.remove(&key).is_some(),
                None => false,
            },
        }
    }
}

/// Owner of one [`Collection`], keeping it in step with the server.
///
/// Mutations hold the ordering gate shared, reloads hold it exclusively, so a
/// reload waits for in-flight mutations and no mutation starts while a
/// reload is fetching.
pub struct CollectionSync<A: ResourceApi = ResourceClient> {
    api: Arc<A>,
    collection: Arc<RwLock<Collection>>,
    gate: Arc<RwLock<()>>,
}

impl<A: ResourceApi> Clone for CollectionSync<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            collection: self.collection.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<A: ResourceApi> CollectionSync<A> {
    pub fn new(api: A) -> Self {
        Self::from_arc(Arc::new(api))
    }

    pub fn from_arc(api: Arc<A>) -> Self {
        let collection = Collection::new(api.key_field().clone());
        Self {
            api,
            collection: Arc::new(RwLock::new(collection)),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn key_field(&self) -> &KeyField {
        self.api.key_field()
    }

    /// Copy of the current instances
    pub async fn snapshot(&self) -> Vec<ResourceInstance> {
        self.collection.read().await.items().to_vec()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Collection> {
        self.collection.read().await
    }

    /// Replace the collection from `GET <base>/`. On failure the collection
    /// is left as it was.
    pub async fn reload(&self) -> Result<usize, Error> {
        let _gate = self.gate.write().await;
        let items = self.api.list().await?;
        let mut collection = self.collection.write().await;
        collection.replace_all(items);
        debug!("Reloaded {} instances", collection.len());
        Ok(collection.len())
    }

    /// Apply a mutation confirmed elsewhere (a custom action, a socket frame)
    pub async fn apply_mutation(&self, kind: MutationKind, instance: &ResourceInstance) -> bool {
        self.collection.write().await.apply(kind, instance)
    }

    /// POST and add the created instance
    pub async fn create(&self, body: RequestBody) -> Result<ResourceInstance, Error> {
        let _gate = self.gate.read().await;
        let created = self.api.create(body).await?;
        self.collection
            .write()
            .await
            .apply(MutationKind::Create, &created);
        Ok(created)
    }

    /// Update optimistically: the submitted fields are written locally first
    /// and undone if the request fails. The key field itself only changes
    /// once the server confirms it.
    pub async fn update(
        &self,
        key: &InstanceKey,
        body: RequestBody,
    ) -> Result<ResourceInstance, Error> {
        let _gate = self.gate.read().await;

        let patch = match body.fields() {
            Some(fields) => self.collection.write().await.apply_patch(key, fields),
            None => None,
        };

        match self.api.update(key, body).await {
            Ok(updated) => {
                self.collection.write().await.merge_at(key, &updated);
                Ok(updated)
            }
            Err(e) => {
                if let Some(patch) = patch.filter(|patch| !patch.is_empty()) {
                    let restored = self.collection.write().await.revert_patch(patch);
                    warn!("Update of {} failed, restored {} field(s)", key, restored);
                }
                Err(e.into())
            }
        }
    }

    /// Delete optimistically. A 404 counts as success since the instance is
    /// gone either way.
    pub async fn delete(&self, key: &InstanceKey) -> Result<(), Error> {
        let _gate = self.gate.read().await;
        let removed = self.collection.write().await.remove(key);

        match self.api.delete(key).await {
            Ok(()) => Ok(()),
            Err(RestError::NotFound { url }) => {
                info!("{} was already deleted", url);
                Ok(())
            }
            Err(e) => {
                if let Some((index, instance)) = removed {
                    warn!("Delete of {} failed, restoring it", key);
                    self.collection.write().await.insert_at(index, instance);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn instance(value: Value) -> ResourceInstance {
        ResourceInstance::from_value(value).unwrap()
    }

    /// In-memory resource that can be told to fail
    struct FakeApi {
        key_field: KeyField,
        rows: Mutex<Vec<ResourceInstance>>,
        next_id: Mutex<i64>,
        fail: Mutex<bool>,
    }

    impl FakeApi {
        fn new(rows: Vec<Value>) -> Self {
            Self {
                key_field: KeyField::default(),
                rows: Mutex::new(rows.into_iter().map(instance).collect()),
                next_id: Mutex::new(100),
                fail: Mutex::new(false),
            }
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn check(&self) -> Result<(), RestError> {
            if *self.fail.lock().unwrap() {
                Err(RestError::UnparsedApiError {
                    message: "Bad Gateway".to_string(),
                    status: reqwest::StatusCode::BAD_GATEWAY,
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ResourceApi for FakeApi {
        fn key_field(&self) -> &KeyField {
            &self.key_field
        }

        async fn list(&self) -> Result<Vec<ResourceInstance>, RestError> {
            self.check()?;
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn create(&self, body: RequestBody) -> Result<ResourceInstance, RestError> {
            self.check()?;
            let mut created = ResourceInstance::new(body.fields().cloned().unwrap_or_default());
            let mut next_id = self.next_id.lock().unwrap();
            created.set("id", json!(*next_id));
            *next_id += 1;
            self.rows.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update(
            &self,
            key: &InstanceKey,
            body: RequestBody,
        ) -> Result<ResourceInstance, RestError> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.key(&self.key_field).as_ref() == Some(key))
                .ok_or(RestError::NotFound { url: key.to_string() })?;
            row.merge(&ResourceInstance::new(body.fields().cloned().unwrap_or_default()));
            Ok(row.clone())
        }

        async fn delete(&self, key: &InstanceKey) -> Result<(), RestError> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| row.key(&self.key_field).as_ref() != Some(key));
            if rows.len() == before {
                return Err(RestError::NotFound { url: key.to_string() });
            }
            Ok(())
        }
    }

    #[test]
    fn test_replace_all_dedupes_later_wins() {
        let mut collection = Collection::new(KeyField::default());
        collection.replace_all(vec![
            instance(json!({ "id": 1, "name": "first" })),
            instance(json!({ "id": 2, "name": "other" })),
            instance(json!({ "id": 1, "name": "second" })),
        ]);

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.items()[0].get("name"), Some(&json!("second")));
        assert_eq!(collection.items()[1].get("id"), Some(&json!(2)));
    }

    #[test]
    fn test_apply_delete_removes_every_match() {
        let mut collection = Collection::new(KeyField::new("username"));
        collection.replace_all(vec![
            instance(json!({ "username": "jdoe" })),
            instance(json!({ "username": "asmith" })),
        ]);

        let removed = collection.apply(MutationKind::Delete, &instance(json!({ "username": "jdoe" })));
        assert!(removed);
        assert!(!collection.contains(&InstanceKey::from("jdoe")));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_create_then_update_keeps_one_element() {
        let mut collection = Collection::new(KeyField::default());
        collection.apply(MutationKind::Create, &instance(json!({ "id": 1, "title": "Advisor" })));
        collection.apply(MutationKind::Create, &instance(json!({ "id": 1, "title": "Advisor" })));
        collection.apply(MutationKind::Update, &instance(json!({ "id": 1, "title": "Faculty" })));

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.items()[0].get("title"), Some(&json!("Faculty")));
    }

    #[test]
    fn test_merge_at_handles_key_change() {
        let mut collection = Collection::new(KeyField::new("code"));
        collection.replace_all(vec![
            instance(json!({ "code": "old", "name": "Club" })),
            instance(json!({ "code": "new", "name": "Stale" })),
        ]);

        collection.merge_at(&InstanceKey::from("old"), &instance(json!({ "code": "new" })));

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.items()[0].get("name"), Some(&json!("Club")));
        assert!(collection.contains(&InstanceKey::from("new")));
    }

    #[test]
    fn test_insert_at_skips_present_key() {
        let mut collection = Collection::new(KeyField::default());
        collection.replace_all(vec![instance(json!({ "id": 1 }))]);
        collection.insert_at(5, instance(json!({ "id": 1 })));
        collection.insert_at(0, instance(json!({ "id": 2 })));

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.items()[0].get("id"), Some(&json!(2)));
    }

    #[test]
    fn test_revert_patch_keeps_later_writes() {
        let mut collection = Collection::new(KeyField::default());
        collection.replace_all(vec![instance(json!({ "id": 1, "name": "Jane", "title": "Advisor" }))]);
        let key = InstanceKey::Number(1);

        let title = collection
            .apply_patch(&key, json!({ "title": "X", "email": "x@upenn.edu" }).as_object().unwrap())
            .unwrap();
        let name = collection
            .apply_patch(&key, json!({ "name": "Janet" }).as_object().unwrap())
            .unwrap();
        assert_eq!(name.key(), &key);

        // the name update is confirmed without the pending title
        collection.merge_at(
            &key,
            &instance(json!({ "id": 1, "name": "Janet", "title": "Advisor" })),
        );
        assert_eq!(collection.revert_patch(title), 1);

        let item = collection.get(&key).unwrap();
        assert_eq!(item.get("name"), Some(&json!("Janet")));
        assert_eq!(item.get("title"), Some(&json!("Advisor")));
        assert_eq!(item.get("email"), None);
    }

    #[test]
    fn test_apply_patch_skips_key_root() {
        let mut collection = Collection::new(KeyField::new("club.code"));
        collection.replace_all(vec![instance(json!({ "club": { "code": "pennlabs" }, "public": false }))]);
        let key = InstanceKey::from("pennlabs");

        let patch = collection
            .apply_patch(&key, json!({ "club": { "code": "chess" }, "public": true }).as_object().unwrap())
            .unwrap();

        assert!(!patch.is_empty());
        let item = collection.get(&key).unwrap();
        assert_eq!(item.get("public"), Some(&json!(true)));
        assert!(collection
            .apply_patch(&InstanceKey::from("chess"), &Map::new())
            .is_none());
    }

    #[tokio::test]
    async fn test_reload_failure_leaves_collection() {
        let sync = CollectionSync::new(FakeApi::new(vec![json!({ "id": 1 })]));
        assert_eq!(sync.reload().await.unwrap(), 1);

        sync.api().set_failing(true);
        assert!(sync.reload().await.is_err());
        assert_eq!(sync.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_failure() {
        let sync = CollectionSync::new(FakeApi::new(vec![json!({ "id": 1, "title": "Advisor" })]));
        sync.reload().await.unwrap();

        sync.api().set_failing(true);
        let result = sync
            .update(&InstanceKey::Number(1), RequestBody::Json(json!({ "title": "Faculty" })))
            .await;

        assert!(result.is_err());
        let items = sync.snapshot().await;
        assert_eq!(items[0].get("title"), Some(&json!("Advisor")));
    }

    #[tokio::test]
    async fn test_delete_restores_position_on_failure() {
        let sync = CollectionSync::new(FakeApi::new(vec![
            json!({ "id": 1 }),
            json!({ "id": 2 }),
            json!({ "id": 3 }),
        ]));
        sync.reload().await.unwrap();

        sync.api().set_failing(true);
        assert!(sync.delete(&InstanceKey::Number(2)).await.is_err());
        let ids: Vec<_> = sync
            .snapshot()
            .await
            .iter()
            .map(|item| item.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_instance_succeeds() {
        let sync = CollectionSync::new(FakeApi::new(vec![]));
        assert!(sync.delete(&InstanceKey::Number(9)).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_adds_server_instance() {
        let sync = CollectionSync::new(FakeApi::new(vec![]));
        let created = sync
            .create(RequestBody::Json(json!({ "name": "Jane Doe" })))
            .await
            .unwrap();

        assert_eq!(created.get("id"), Some(&json!(100)));
        let collection = sync.read().await;
        assert!(collection.contains(&InstanceKey::Number(100)));
    }
}
