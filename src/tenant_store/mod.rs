//! Read-only view of the platform's tenant registry.
//!
//! The orchestrator only consumes tenant identity; tenants are created and
//! managed elsewhere. The list is re-read on every orchestrator tick because
//! it can change between ticks.

use crate::sqlite_column;
use crate::sqlite_persistence::{open_database, Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// An isolated customer/organization partition of the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

pub trait TenantStore: Send + Sync {
    /// All active tenants, ordered by id.
    fn active_tenants(&self) -> Result<Vec<Tenant>>;
}

const TENANTS_TABLE_V1: Table = Table {
    name: "tenants",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[("idx_tenants_slug", "slug")],
};

const PLATFORM_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[TENANTS_TABLE_V1],
    migration: None,
}];

pub struct SqliteTenantStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTenantStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_database(db_path, PLATFORM_VERSIONED_SCHEMAS, "platform")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Seed helper for tests and provisioning scripts.
    pub fn insert_tenant(&self, slug: &str, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tenants (slug, name) VALUES (?1, ?2)",
            params![slug, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Deactivate a tenant so the iterator skips it.
    pub fn deactivate_tenant(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE tenants SET is_active = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl TenantStore for SqliteTenantStore {
    fn active_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, slug, name FROM tenants WHERE is_active = 1 ORDER BY id")?;
        let tenants = stmt
            .query_map([], |row| {
                Ok(Tenant {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn active_tenants_skips_deactivated() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteTenantStore::new(temp_dir.path().join("platform.db")).unwrap();

        let brighton = store.insert_tenant("brighton", "Brighton Timebank").unwrap();
        store.insert_tenant("leeds", "Leeds Hour Exchange").unwrap();

        let tenants = store.active_tenants().unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].slug, "brighton");

        store.deactivate_tenant(brighton).unwrap();
        let tenants = store.active_tenants().unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].slug, "leeds");
    }

    #[test]
    fn reopen_keeps_tenants() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("platform.db");
        {
            let store = SqliteTenantStore::new(&path).unwrap();
            store.insert_tenant("brighton", "Brighton Timebank").unwrap();
        }
        let store = SqliteTenantStore::new(&path).unwrap();
        assert_eq!(store.active_tenants().unwrap().len(), 1);
    }
}
