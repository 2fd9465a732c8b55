//! Process-wide descriptor cache, keyed by type identity.
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use super::{RecordType, TypeDescriptor};
use crate::error::SchemaError;

static DESCRIPTORS: Lazy<RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub(crate) fn descriptor_of(record: &RecordType) -> Result<Arc<TypeDescriptor>, SchemaError> {
    let id = record.type_id();
    if let Some(hit) = DESCRIPTORS.read().unwrap_or_else(PoisonError::into_inner).get(&id) {
        return Ok(Arc::clone(hit));
    }
    // Resolve outside the lock: resolution of nested records re-enters here.
    let resolved = Arc::new(super::resolve(record)?);
    tracing::debug!(record = record.name, fields = resolved.len(), "type descriptor resolved");
    let mut guard = DESCRIPTORS.write().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(guard.entry(id).or_insert(resolved)))
}
