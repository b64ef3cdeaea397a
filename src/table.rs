//! Resource table renderer
//!
//! Turns a [`Collection`] into a [`TableView`]: filtered by a search query,
//! paginated, one [`TableRow`] of display strings per instance with the row
//! actions that apply to it.

use clubs_rust_rest::{InstanceKey, ResourceApi, ResourceInstance};
use clubs_rust_schema::ColumnSpec;
use log::debug;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::collection::{Collection, CollectionSync};
use crate::error::Error;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_EMPTY_MESSAGE: &str = "There are no items to display.";

/// Callback behind a custom row action
pub type ActionCallback = Arc<dyn Fn(&ResourceInstance) + Send + Sync>;

/// Action offered on a table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum RowAction {
    Edit,
    Delete,
    Custom(String),
}

#[derive(Clone)]
struct CustomAction {
    name: String,
    label: String,
    callback: ActionCallback,
}

/// One rendered row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub key: Option<InstanceKey>,
    pub cells: Vec<String>,
    pub actions: Vec<RowAction>,
}

/// One page of matching rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    /// Rows matching the query, across all pages
    pub total_rows: usize,
    /// Zero-based
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub query: String,
}

/// What the table area should show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableView {
    /// The collection has no instances at all
    Empty { message: String },
    /// Possibly zero rows when nothing matches the query
    Rows(TablePage),
}

/// Result of invoking a row action
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Open the edit form for this instance
    Edit(ResourceInstance),
    /// Delete right away
    Delete(ResourceInstance),
    /// Ask the user first
    ConfirmDeletion(PendingDeletion),
    /// A custom callback ran
    Handled,
}

/// A delete waiting for confirmation; dropping it cancels
#[derive(Debug, Clone)]
pub struct PendingDeletion {
    key: InstanceKey,
    instance: ResourceInstance,
}

impl PendingDeletion {
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn instance(&self) -> &ResourceInstance {
        &self.instance
    }

    pub async fn confirm<A: ResourceApi>(self, sync: &CollectionSync<A>) -> Result<(), Error> {
        sync.delete(&self.key).await
    }
}

/// Searchable, paginated table over a collection
#[derive(Clone)]
pub struct ResourceTable {
    columns: Vec<ColumnSpec>,
    search_columns: Option<Vec<String>>,
    page_size: usize,
    empty_message: String,
    allow_edit: bool,
    allow_delete: bool,
    confirm_deletion: bool,
    custom_actions: Vec<CustomAction>,
}

impl ResourceTable {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            search_columns: None,
            page_size: DEFAULT_PAGE_SIZE,
            empty_message: DEFAULT_EMPTY_MESSAGE.to_string(),
            allow_edit: true,
            allow_delete: true,
            confirm_deletion: false,
            custom_actions: Vec::new(),
        }
    }

    /// Search only these columns instead of all of them
    pub fn with_search_columns(mut self, names: &[&str]) -> Self {
        self.search_columns = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_empty_message(mut self, message: &str) -> Self {
        self.empty_message = message.to_string();
        self
    }

    pub fn with_edit(mut self, allow: bool) -> Self {
        self.allow_edit = allow;
        self
    }

    pub fn with_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    pub fn with_confirm_deletion(mut self, confirm: bool) -> Self {
        self.confirm_deletion = confirm;
        self
    }

    pub fn with_action<F>(mut self, name: &str, label: &str, callback: F) -> Self
    where
        F: Fn(&ResourceInstance) + Send + Sync + 'static,
    {
        self.custom_actions.push(CustomAction {
            name: name.to_string(),
            label: label.to_string(),
            callback: Arc::new(callback),
        });
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.label.clone()).collect()
    }

    /// Label of a custom action, for its button
    pub fn action_label(&self, name: &str) -> Option<&str> {
        self.custom_actions
            .iter()
            .find(|action| action.name == name)
            .map(|action| action.label.as_str())
    }

    fn row_actions(&self) -> Vec<RowAction> {
        let mut actions = Vec::new();
        if self.allow_edit {
            actions.push(RowAction::Edit);
        }
        if self.allow_delete {
            actions.push(RowAction::Delete);
        }
        actions.extend(
            self.custom_actions
                .iter()
                .map(|action| RowAction::Custom(action.name.clone())),
        );
        actions
    }

    fn matches(&self, instance: &ResourceInstance, needle: &str) -> bool {
        self.columns
            .iter()
            .filter(|column| match &self.search_columns {
                Some(names) => names.iter().any(|name| name == &column.name),
                None => true,
            })
            .any(|column| {
                column
                    .render_cell(instance.fields())
                    .to_lowercase()
                    .contains(needle)
            })
    }

    /// Instances matching `query`, case-insensitively. A blank query
    /// matches everything.
    pub fn filter<'a>(&self, collection: &'a Collection, query: &str) -> Vec<&'a ResourceInstance> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return collection.iter().collect();
        }
        collection
            .iter()
            .filter(|instance| self.matches(instance, &needle))
            .collect()
    }

    /// Page `index` (zero-based, clamped to the last page) of `size` rows
    pub fn page(&self, collection: &Collection, query: &str, index: usize, size: usize) -> TableView {
        if collection.is_empty() {
            return TableView::Empty {
                message: self.empty_message.clone(),
            };
        }

        let size = size.max(1);
        let matching = self.filter(collection, query);
        let total_rows = matching.len();
        let page_count = total_rows.div_ceil(size).max(1);
        let page = index.min(page_count - 1);
        debug!(
            "Table query {:?}: {} of {} rows, page {}/{}",
            query,
            total_rows,
            collection.len(),
            page + 1,
            page_count
        );

        let actions = self.row_actions();
        let rows = matching
            .into_iter()
            .skip(page * size)
            .take(size)
            .map(|instance| TableRow {
                key: collection.key_of(instance),
                cells: self
                    .columns
                    .iter()
                    .map(|column| column.render_cell(instance.fields()))
                    .collect(),
                actions: actions.clone(),
            })
            .collect();

        TableView::Rows(TablePage {
            headers: self.headers(),
            rows,
            total_rows,
            page,
            page_count,
            page_size: size,
            query: query.to_string(),
        })
    }

    /// Page `index` with the configured page size
    pub fn render(&self, collection: &Collection, query: &str, index: usize) -> TableView {
        self.page(collection, query, index, self.page_size)
    }

    /// Run `action` on the row with `key`
    pub fn invoke(
        &self,
        collection: &Collection,
        key: &InstanceKey,
        action: &RowAction,
    ) -> Result<ActionOutcome, Error> {
        let instance = collection
            .get(key)
            .ok_or_else(|| Error::general(format!("No row with key {}", key)))?;

        match action {
            RowAction::Edit if self.allow_edit => Ok(ActionOutcome::Edit(instance.clone())),
            RowAction::Delete if self.allow_delete => {
                if self.confirm_deletion {
                    Ok(ActionOutcome::ConfirmDeletion(PendingDeletion {
                        key: key.clone(),
                        instance: instance.clone(),
                    }))
                } else {
                    Ok(ActionOutcome::Delete(instance.clone()))
                }
            }
            RowAction::Custom(name) => {
                let custom = self
                    .custom_actions
                    .iter()
                    .find(|custom| &custom.name == name)
                    .ok_or_else(|| Error::general(format!("Unknown action: {}", name)))?;
                (custom.callback)(instance);
                Ok(ActionOutcome::Handled)
            }
            other => Err(Error::general(format!("Action not enabled: {:?}", other))),
        }
    }
}

impl fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTable")
            .field("columns", &self.columns)
            .field("search_columns", &self.search_columns)
            .field("page_size", &self.page_size)
            .field("confirm_deletion", &self.confirm_deletion)
            .field("actions", &self.row_actions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubs_rust_rest::KeyField;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn members() -> Collection {
        let mut collection = Collection::new(KeyField::new("username"));
        collection.replace_all(
            [
                json!({ "username": "jdoe", "name": "Jane Doe", "title": "President", "active": true }),
                json!({ "username": "asmith", "name": "Alex Smith", "title": "Treasurer", "active": false }),
                json!({ "username": "bkim", "name": "Bo Kim", "title": "Member", "active": true }),
            ]
            .into_iter()
            .map(|value: Value| ResourceInstance::from_value(value).unwrap())
            .collect(),
        );
        collection
    }

    fn table() -> ResourceTable {
        ResourceTable::new(vec![
            ColumnSpec::new("name", "Name"),
            ColumnSpec::new("title", "Title"),
            ColumnSpec::new("active", "Active"),
        ])
    }

    fn rows(view: TableView) -> TablePage {
        match view {
            TableView::Rows(page) => page,
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_collection_shows_empty_state() {
        let collection = Collection::new(KeyField::default());
        let view = table().with_empty_message("No members yet.").render(&collection, "", 0);
        assert_eq!(
            view,
            TableView::Empty {
                message: "No members yet.".to_string()
            }
        );
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let page = rows(table().render(&members(), "  TREAS ", 0));
        assert_eq!(page.total_rows, 1);
        assert_eq!(page.rows[0].key, Some(InstanceKey::from("asmith")));
        assert_eq!(page.rows[0].cells, vec!["Alex Smith", "Treasurer", "No"]);
    }

    #[test]
    fn test_search_columns_limit_matching() {
        let table = table().with_search_columns(&["name"]);
        let page = rows(table.render(&members(), "member", 0));
        assert_eq!(page.total_rows, 0);
        assert!(page.rows.is_empty());
        assert_eq!(page.query, "member");
    }

    #[test]
    fn test_pagination_clamps_index() {
        let page = rows(table().page(&members(), "", 7, 2));
        assert_eq!(page.page_count, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.headers, vec!["Name", "Title", "Active"]);
    }

    #[test]
    fn test_delete_with_confirmation() {
        let collection = members();
        let table = table().with_confirm_deletion(true);
        let outcome = table
            .invoke(&collection, &InstanceKey::from("bkim"), &RowAction::Delete)
            .unwrap();

        match outcome {
            ActionOutcome::ConfirmDeletion(pending) => {
                assert_eq!(pending.key(), &InstanceKey::from("bkim"));
                assert_eq!(pending.instance().get("name"), Some(&json!("Bo Kim")));
            }
            other => panic!("expected a confirmation, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_action_runs_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let table = table()
            .with_edit(false)
            .with_action("resend", "Resend Invite", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let collection = members();
        let page = rows(table.render(&collection, "", 0));
        assert_eq!(
            page.rows[0].actions,
            vec![RowAction::Delete, RowAction::Custom("resend".into())]
        );
        assert_eq!(table.action_label("resend"), Some("Resend Invite"));

        let outcome = table
            .invoke(&collection, &InstanceKey::from("jdoe"), &RowAction::Custom("resend".into()))
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Handled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(table
            .invoke(&collection, &InstanceKey::from("jdoe"), &RowAction::Edit)
            .is_err());
    }
}
