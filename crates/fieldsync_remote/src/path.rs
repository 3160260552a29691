//! Tenant-scoped collection paths.

use crate::error::{RemoteError, RemoteResult};
use std::fmt;

const ROOT: &str = "tenants";
const ENTITIES: &str = "entities";
const ITEMS: &str = "items";

/// Identifier of a tenant (company) in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantId(String);

impl TenantId {
    /// Validates and wraps a tenant id.
    ///
    /// Rejects empty ids, `.`/`..` and anything containing `/`.
    pub fn new(id: impl Into<String>) -> RemoteResult<Self> {
        let id = id.into();
        if is_segment(&id) {
            Ok(Self(id))
        } else {
            Err(RemoteError::InvalidTenant(id))
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_segment(s: &str) -> bool {
    !s.trim().is_empty() && s != "." && s != ".." && !s.contains('/')
}

/// Path of an entity collection inside one tenant.
///
/// Rendered as `tenants/{tenant}/entities/{entity}/items`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath {
    tenant: TenantId,
    entity: String,
}

impl CollectionPath {
    /// Tenant owning the collection.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Entity collection name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Parses a rendered path.
    pub fn parse(path: &str) -> RemoteResult<Self> {
        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            [ROOT, tenant, ENTITIES, entity, ITEMS] => {
                let tenant = TenantId::new(*tenant).map_err(|_| RemoteError::InvalidPath(path.to_string()))?;
                collection_reference(&tenant, entity)
            }
            _ => Err(RemoteError::InvalidPath(path.to_string())),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ROOT}/{}/{ENTITIES}/{}/{ITEMS}", self.tenant, self.entity)
    }
}

/// Builds the canonical collection path for an entity of a tenant.
pub fn collection_reference(tenant: &TenantId, entity_name: &str) -> RemoteResult<CollectionPath> {
    if !is_segment(entity_name) {
        return Err(RemoteError::InvalidPath(entity_name.to_string()));
    }
    Ok(CollectionPath {
        tenant: tenant.clone(),
        entity: entity_name.to_string(),
    })
}
