use super::Reducer;
use crate::core::{Action, ActionKind, CategoryKind, CategoryPatch, CategoryRecord, EntityRef, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoriesState {
    live: BTreeMap<String, CategoryRecord>,
    deleted: BTreeSet<String>,
}

impl CategoriesState {
    pub fn get(&self, id: &str) -> Option<&CategoryRecord> {
        self.live.get(id)
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRecord> {
        self.live.values()
    }

    pub fn of_kind(&self, kind: CategoryKind) -> impl Iterator<Item = &CategoryRecord> {
        self.live.values().filter(move |record| record.kind == kind)
    }
}

impl Reducer for CategoriesState {
    fn name(&self) -> &'static str {
        "categories"
    }

    fn reduce(&mut self, action: &Action) -> Result<()> {
        match action.kind {
            ActionKind::AddCategory => {
                let record: CategoryRecord = action.decode_payload()?;
                if self.deleted.contains(&record.id) || self.live.contains_key(&record.id) {
                    return Ok(());
                }
                self.live.insert(record.id.clone(), record);
            }
            ActionKind::EditCategory => {
                let patch: CategoryPatch = action.decode_payload()?;
                if let Some(record) = self.live.get_mut(&patch.id) {
                    patch.apply_to(record);
                }
            }
            ActionKind::DeleteCategory => {
                let target: EntityRef = action.decode_payload()?;
                if self.live.remove(&target.id).is_some() {
                    self.deleted.insert(target.id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
