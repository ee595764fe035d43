//! Type registry: wire tag <-> record type.
//!
//! Built once at startup and read-only afterwards, so it can be shared behind
//! an `Arc` by every envelope and codec call.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{QmsgError, Result};
use crate::record::{Record, RecordType};

#[derive(Debug, Default)]
pub struct Registry {
    by_tag: HashMap<&'static str, RecordType>,
    by_type: HashMap<TypeId, &'static str>,
}

impl Registry {
    /// Build a registry, rejecting missing tags and any repeated tag or type.
    pub fn build(types: impl IntoIterator<Item = RecordType>) -> Result<Self> {
        let mut registry = Registry::default();

        for rt in types {
            let tag = rt.tag().ok_or_else(|| {
                QmsgError::Configuration(format!(
                    "expected record type with a declared tag: {}",
                    rt.type_name()
                ))
            })?;

            if let Some(existing) = registry.by_type.get(&rt.type_id()) {
                return Err(QmsgError::Configuration(format!(
                    "record type {} registered under multiple tags: {existing}, {tag}",
                    rt.type_name()
                )));
            }
            if registry.by_tag.contains_key(tag) {
                return Err(QmsgError::Configuration(format!(
                    "multiple record types defined for tag: {tag}"
                )));
            }

            registry.by_type.insert(rt.type_id(), tag);
            registry.by_tag.insert(tag, rt);
        }

        tracing::debug!(types = registry.len(), "type registry built");
        Ok(registry)
    }

    pub fn tag_for<R: Record>(&self) -> Option<&'static str> {
        self.tag_for_type(TypeId::of::<R>())
    }

    pub fn tag_for_type(&self, type_id: TypeId) -> Option<&'static str> {
        self.by_type.get(&type_id).copied()
    }

    pub fn type_for(&self, tag: &str) -> Option<&RecordType> {
        self.by_tag.get(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.by_tag.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}
