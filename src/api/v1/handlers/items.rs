//! In-memory items, guarded per route by RBAC operations.
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use parking_lot::RwLock;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    items: Arc<RwLock<BTreeMap<u64, Item>>>,
}

impl ItemStore {
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let map = items.into_iter().map(|item| (item.id, item)).collect();
        Self {
            items: Arc::new(RwLock::new(map)),
        }
    }

    pub fn list(&self) -> Vec<Item> {
        self.items.read().values().cloned().collect()
    }

    pub fn remove(&self, id: u64) -> Option<Item> {
        self.items.write().remove(&id)
    }
}

pub async fn list_items(State(state): State<AppState>) -> Json<Vec<Item>> {
    Json(state.items.list())
}

pub async fn delete_item(State(state): State<AppState>, Path(id): Path<u64>) -> StatusCode {
    match state.items.remove(id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}
