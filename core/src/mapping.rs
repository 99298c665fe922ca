//! Declared record shapes: which remote entity a Rust type reads from and
//! how its fields are named on the wire.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::types::Record;

/// A type that can be listed through `EntityService::list_as`.
pub trait EntityShape: DeserializeOwned {
    fn mapping() -> EntityMapping;
}

/// Remote entity name plus ordered `(local, remote)` field-name pairs.
///
/// Remote names may be property paths such as `businessPartner$name`; only
/// the part before the first `$` is requested from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    type_name: String,
    entity: Option<String>,
    fields: Vec<(String, String)>,
}

impl EntityMapping {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            entity: None,
            fields: Vec::new(),
        }
    }

    /// Use `entity` instead of the type name as the remote entity.
    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_string());
        self
    }

    /// A field whose remote name equals its local name.
    pub fn field(self, name: &str) -> Self {
        self.field_as(name, name)
    }

    pub fn field_as(mut self, local: &str, remote: &str) -> Self {
        self.fields.push((local.to_string(), remote.to_string()));
        self
    }

    pub fn entity_name(&self) -> &str {
        self.entity.as_deref().unwrap_or(&self.type_name)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// `_selectedProperties` entries in declaration order, without duplicates.
    pub fn selected_properties(&self) -> Vec<String> {
        let mut props: Vec<String> = Vec::with_capacity(self.fields.len());
        for (_, remote) in &self.fields {
            let root = remote.split('$').next().unwrap_or(remote);
            if !props.iter().any(|p| p == root) {
                props.push(root.to_string());
            }
        }
        props
    }

    /// Renames remote keys to local names. Fields the record lacks are
    /// left out.
    pub fn localize(&self, record: &Record) -> Record {
        self.fields
            .iter()
            .filter_map(|(local, remote)| record.get(remote).map(|v| (local.clone(), v.clone())))
            .collect()
    }

    pub fn to_shape<T: DeserializeOwned>(&self, record: &Record) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.localize(record))).map_err(|e| Error::Mapping {
            entity: self.entity_name().to_string(),
            reason: e.to_string(),
        })
    }
}
