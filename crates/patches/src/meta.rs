//! Doctype field metadata and property setters.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::PatchError;

/// A field definition on a doctype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub doctype: String,
    pub fieldname: String,
    #[serde(default)]
    pub options: Option<String>,
}

impl FieldMeta {
    pub fn new(doctype: impl Into<String>, fieldname: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            fieldname: fieldname.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }
}

/// Site-level override of one field property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySetter {
    pub name: String,
    pub doc_type: String,
    pub field_name: String,
    pub property: String,
    pub value: String,
}

/// Field metadata storage.
pub trait MetaStore: Send + Sync {
    fn field(&self, doctype: &str, fieldname: &str) -> Result<Option<FieldMeta>, PatchError>;

    fn save_field(&self, field: &FieldMeta) -> Result<(), PatchError>;

    fn property_setter(
        &self,
        doctype: &str,
        fieldname: &str,
        property: &str,
    ) -> Result<Option<PropertySetter>, PatchError>;

    fn delete_property_setter(&self, name: &str) -> Result<(), PatchError>;

    /// Drop cached metadata so the next read sees saved changes.
    fn clear_cache(&self, doctype: &str) -> Result<(), PatchError>;
}

impl<S: MetaStore + ?Sized> MetaStore for Arc<S> {
    fn field(&self, doctype: &str, fieldname: &str) -> Result<Option<FieldMeta>, PatchError> {
        (**self).field(doctype, fieldname)
    }

    fn save_field(&self, field: &FieldMeta) -> Result<(), PatchError> {
        (**self).save_field(field)
    }

    fn property_setter(
        &self,
        doctype: &str,
        fieldname: &str,
        property: &str,
    ) -> Result<Option<PropertySetter>, PatchError> {
        (**self).property_setter(doctype, fieldname, property)
    }

    fn delete_property_setter(&self, name: &str) -> Result<(), PatchError> {
        (**self).delete_property_setter(name)
    }

    fn clear_cache(&self, doctype: &str) -> Result<(), PatchError> {
        (**self).clear_cache(doctype)
    }
}

#[derive(Debug, Default)]
struct MetaState {
    fields: BTreeMap<(String, String), FieldMeta>,
    setters: BTreeMap<String, PropertySetter>,
    cache_clears: HashMap<String, usize>,
}

/// In-memory metadata (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    state: RwLock<MetaState>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MetaState>, PatchError> {
        self.state
            .read()
            .map_err(|_| PatchError::Storage("meta lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MetaState>, PatchError> {
        self.state
            .write()
            .map_err(|_| PatchError::Storage("meta lock poisoned".into()))
    }

    pub fn insert_property_setter(&self, setter: PropertySetter) -> Result<(), PatchError> {
        self.write()?.setters.insert(setter.name.clone(), setter);
        Ok(())
    }

    pub fn property_setters(&self) -> Result<Vec<PropertySetter>, PatchError> {
        Ok(self.read()?.setters.values().cloned().collect())
    }

    /// How often the cache of `doctype` was cleared.
    pub fn cache_clears(&self, doctype: &str) -> Result<usize, PatchError> {
        Ok(self.read()?.cache_clears.get(doctype).copied().unwrap_or(0))
    }
}

impl MetaStore for InMemoryMetaStore {
    fn field(&self, doctype: &str, fieldname: &str) -> Result<Option<FieldMeta>, PatchError> {
        Ok(self
            .read()?
            .fields
            .get(&(doctype.to_string(), fieldname.to_string()))
            .cloned())
    }

    fn save_field(&self, field: &FieldMeta) -> Result<(), PatchError> {
        self.write()?.fields.insert(
            (field.doctype.clone(), field.fieldname.clone()),
            field.clone(),
        );
        Ok(())
    }

    fn property_setter(
        &self,
        doctype: &str,
        fieldname: &str,
        property: &str,
    ) -> Result<Option<PropertySetter>, PatchError> {
        Ok(self
            .read()?
            .setters
            .values()
            .find(|s| s.doc_type == doctype && s.field_name == fieldname && s.property == property)
            .cloned())
    }

    fn delete_property_setter(&self, name: &str) -> Result<(), PatchError> {
        self.write()?
            .setters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PatchError::PropertySetterNotFound(name.to_string()))
    }

    fn clear_cache(&self, doctype: &str) -> Result<(), PatchError> {
        *self
            .write()?
            .cache_clears
            .entry(doctype.to_string())
            .or_default() += 1;
        Ok(())
    }
}
