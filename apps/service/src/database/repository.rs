use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

use super::models::{
    Host, Service, ServiceDefinition, ServiceStatus, Timestamps, WatchdogSchedule,
};
use crate::error::{ScheduleError, StoreError};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Sort keys accepted by the windowed range query. This doubles as the
/// pagination allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Name,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn reversed(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }

    fn order_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }

    /// Comparison operator selecting records strictly beyond an anchor
    /// when scanning in this direction.
    fn beyond_sql(self) -> &'static str {
        match self {
            SortDir::Asc => ">",
            SortDir::Desc => "<",
        }
    }
}

/// Service registry: CRUD, counts and ordered range queries.
///
/// Status and probe-timestamp writes are field-subset updates keyed by id,
/// so concurrent probes never race on whole-document writes.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn insert(&self, definition: &ServiceDefinition) -> Result<Service, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Service>, StoreError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Service>, StoreError>;

    /// All services in id order.
    async fn all(&self) -> Result<Vec<Service>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn count_with_status(&self, status: ServiceStatus) -> Result<u64, StoreError>;

    /// Replace the API-mutable fields and bump `edited`.
    async fn update_definition(
        &self,
        id: i64,
        definition: &ServiceDefinition,
        edited: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_status(&self, id: i64, status: ServiceStatus) -> Result<(), StoreError>;

    async fn touch_last_tested(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn touch_last_responded(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Returns false if no such service existed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Up to `limit` services strictly beyond `anchor` (or from the edge
    /// when no anchor is given), scanning in `dir` order over `field`.
    async fn window(
        &self,
        field: SortField,
        dir: SortDir,
        anchor: Option<&Service>,
        limit: u32,
    ) -> Result<Vec<Service>, StoreError>;

    /// Whether any record exists strictly beyond `anchor` along `field`
    /// in `dir` order.
    async fn exists_beyond(
        &self,
        field: SortField,
        dir: SortDir,
        anchor: &Service,
    ) -> Result<bool, StoreError>;
}

/// Watchdog schedule entry store: read by name, write back.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<WatchdogSchedule, ScheduleError>;

    async fn save(&self, entry: &WatchdogSchedule) -> Result<(), ScheduleError>;
}

const SERVICE_COLUMNS: &str =
    "id, name, host_kind, host_value, port, proto, status, created, edited, last_tested, \
     last_responded";

/// LibSQL-backed implementation of both stores.
pub struct Registry {
    pool: LibsqlPool,
}

impl Registry {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {millis} out of range")))
}

fn service_from_row(row: &libsql::Row) -> Result<Service, StoreError> {
    let host_kind: String = row.get(2)?;
    let proto: String = row.get(5)?;
    let status: String = row.get(6)?;

    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        host: Host {
            kind: host_kind.parse().map_err(StoreError::Corrupt)?,
            value: row.get(3)?,
        },
        port: row.get(4)?,
        proto: proto.parse().map_err(StoreError::Corrupt)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        timestamps: Timestamps {
            created: from_millis(row.get(7)?)?,
            edited: from_millis(row.get(8)?)?,
            last_tested: row.get::<Option<i64>>(9)?.map(from_millis).transpose()?,
            last_responded: row.get::<Option<i64>>(10)?.map(from_millis).transpose()?,
        },
    })
}

fn map_write_err(err: libsql::Error) -> StoreError {
    if err.to_string().contains("UNIQUE constraint failed") {
        StoreError::Conflict { field: "name" }
    } else {
        StoreError::Query(err)
    }
}

#[async_trait]
impl ServiceStore for Registry {
    async fn insert(&self, definition: &ServiceDefinition) -> Result<Service, StoreError> {
        let conn = self.conn().await?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO services (name, host_kind, host_value, port, proto, status, created, \
             edited) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                definition.name.clone(),
                definition.host.kind.to_string(),
                definition.host.value.clone(),
                definition.port.clone(),
                definition.proto.to_string(),
                ServiceStatus::Unknown.to_string(),
                to_millis(now),
                to_millis(now)
            ],
        )
        .await
        .map_err(map_write_err)?;

        Ok(Service {
            id: conn.last_insert_rowid(),
            name: definition.name.clone(),
            host: definition.host.clone(),
            port: definition.port.clone(),
            proto: definition.proto,
            status: ServiceStatus::Unknown,
            timestamps: Timestamps {
                created: now,
                edited: now,
                last_tested: None,
                last_responded: None,
            },
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Service>, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Service>, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE name = ?"),
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn all(&self) -> Result<Vec<Service>, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"), ())
            .await?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM services", ()).await?;
        let row = rows.next().await?.ok_or(libsql::Error::QueryReturnedNoRows)?;
        Ok(row.get::<i64>(0)? as u64)
    }

    async fn count_with_status(&self, status: ServiceStatus) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM services WHERE status = ?", params![status.to_string()])
            .await?;
        let row = rows.next().await?.ok_or(libsql::Error::QueryReturnedNoRows)?;
        Ok(row.get::<i64>(0)? as u64)
    }

    async fn update_definition(
        &self,
        id: i64,
        definition: &ServiceDefinition,
        edited: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE services SET name = ?, host_kind = ?, host_value = ?, port = ?, proto = ?, \
             edited = ? WHERE id = ?",
            params![
                definition.name.clone(),
                definition.host.kind.to_string(),
                definition.host.value.clone(),
                definition.port.clone(),
                definition.proto.to_string(),
                to_millis(edited),
                id
            ],
        )
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn set_status(&self, id: i64, status: ServiceStatus) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE services SET status = ? WHERE id = ?",
            params![status.to_string(), id],
        )
        .await?;
        Ok(())
    }

    async fn touch_last_tested(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE services SET last_tested = ? WHERE id = ?",
            params![to_millis(at), id],
        )
        .await?;
        Ok(())
    }

    async fn touch_last_responded(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE services SET last_responded = ? WHERE id = ?",
            params![to_millis(at), id],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let affected = conn.execute("DELETE FROM services WHERE id = ?", params![id]).await?;
        Ok(affected > 0)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let affected = conn.execute("DELETE FROM services", ()).await?;
        Ok(affected)
    }

    async fn window(
        &self,
        field: SortField,
        dir: SortDir,
        anchor: Option<&Service>,
        limit: u32,
    ) -> Result<Vec<Service>, StoreError> {
        let conn = self.conn().await?;
        let column = field.column();
        let order = dir.order_sql();

        let mut rows = match anchor {
            None => {
                let sql = format!(
                    "SELECT {SERVICE_COLUMNS} FROM services ORDER BY {column} {order} LIMIT ?"
                );
                conn.query(&sql, params![limit as i64]).await?
            }
            Some(anchor) => {
                let op = dir.beyond_sql();
                let sql = format!(
                    "SELECT {SERVICE_COLUMNS} FROM services WHERE {column} {op} ? ORDER BY \
                     {column} {order} LIMIT ?"
                );
                match field {
                    SortField::Id => conn.query(&sql, params![anchor.id, limit as i64]).await?,
                    SortField::Name => {
                        conn.query(&sql, params![anchor.name.clone(), limit as i64]).await?
                    }
                }
            }
        };

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    async fn exists_beyond(
        &self,
        field: SortField,
        dir: SortDir,
        anchor: &Service,
    ) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT 1 FROM services WHERE {} {} ? LIMIT 1",
            field.column(),
            dir.beyond_sql()
        );
        let mut rows = match field {
            SortField::Id => conn.query(&sql, params![anchor.id]).await?,
            SortField::Name => conn.query(&sql, params![anchor.name.clone()]).await?,
        };
        Ok(rows.next().await?.is_some())
    }
}

#[async_trait]
impl ScheduleStore for Registry {
    async fn load(&self, name: &str) -> Result<WatchdogSchedule, ScheduleError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))?;

        let mut rows = conn
            .query(
                "SELECT name, enabled, interval_seconds FROM schedules WHERE name = ?",
                params![name],
            )
            .await
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))?
            .ok_or_else(|| ScheduleError::MissingEntry(name.to_string()))?;

        Ok(WatchdogSchedule {
            name: row.get(0).map_err(|e| ScheduleError::Unavailable(e.to_string()))?,
            enabled: row
                .get::<i64>(1)
                .map_err(|e| ScheduleError::Unavailable(e.to_string()))?
                != 0,
            interval_seconds: row
                .get::<i64>(2)
                .map_err(|e| ScheduleError::Unavailable(e.to_string()))?
                as u64,
        })
    }

    async fn save(&self, entry: &WatchdogSchedule) -> Result<(), ScheduleError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))?;

        // Last-writer-wins by design; concurrent toggles are accepted.
        conn.execute(
            "UPDATE schedules SET enabled = ?, interval_seconds = ? WHERE name = ?",
            params![
                if entry.enabled { 1 } else { 0 },
                entry.interval_seconds as i64,
                entry.name.clone()
            ],
        )
        .await
        .map_err(|e| ScheduleError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{HostKind, Proto};
    use crate::database::testutil::test_registry;

    fn definition(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            host: Host { kind: HostKind::Ip, value: "192.168.1.11".into() },
            port: "22".into(),
            proto: Proto::Tcp,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let (registry, _dir) = test_registry().await;

        let created = registry.insert(&definition("test-service-ssh")).await.unwrap();
        assert_eq!(created.status, ServiceStatus::Unknown);
        assert!(created.timestamps.last_tested.is_none());

        let fetched = registry.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let by_name = registry.get_by_name("test-service-ssh").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        assert!(registry.get(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let (registry, _dir) = test_registry().await;

        registry.insert(&definition("svc")).await.unwrap();
        let err = registry.insert(&definition("svc")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "name" }));
    }

    #[tokio::test]
    async fn status_and_timestamp_updates_are_field_subsets() {
        let (registry, _dir) = test_registry().await;
        let created = registry.insert(&definition("svc")).await.unwrap();

        let now = Utc::now();
        registry.set_status(created.id, ServiceStatus::Up).await.unwrap();
        registry.touch_last_tested(created.id, now).await.unwrap();
        registry.touch_last_responded(created.id, now).await.unwrap();

        let updated = registry.get(created.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ServiceStatus::Up);
        assert!(updated.timestamps.last_tested.is_some());
        assert!(updated.timestamps.last_responded.is_some());
        // Definition fields untouched.
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.timestamps.edited, created.timestamps.edited);

        assert_eq!(registry.count_with_status(ServiceStatus::Up).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_and_delete_all() {
        let (registry, _dir) = test_registry().await;
        let a = registry.insert(&definition("a")).await.unwrap();
        registry.insert(&definition("b")).await.unwrap();

        assert!(registry.delete(a.id).await.unwrap());
        assert!(!registry.delete(a.id).await.unwrap());

        assert_eq!(registry.delete_all().await.unwrap(), 1);
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn window_scans_forward_and_backward() {
        let (registry, _dir) = test_registry().await;
        for name in ["a", "b", "c", "d"] {
            registry.insert(&definition(name)).await.unwrap();
        }

        let first_two =
            registry.window(SortField::Name, SortDir::Asc, None, 2).await.unwrap();
        let names: Vec<&str> = first_two.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let beyond = registry
            .window(SortField::Name, SortDir::Asc, Some(&first_two[1]), 10)
            .await
            .unwrap();
        let names: Vec<&str> = beyond.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["c", "d"]);

        assert!(registry
            .exists_beyond(SortField::Name, SortDir::Asc, &first_two[1])
            .await
            .unwrap());
        assert!(!registry
            .exists_beyond(SortField::Name, SortDir::Desc, &first_two[0])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn schedule_entry_round_trip() {
        let (registry, _dir) = test_registry().await;

        let mut entry =
            ScheduleStore::load(&*registry, crate::watchdog::WATCHDOG_ENTRY_NAME).await.unwrap();
        assert!(!entry.enabled);

        entry.enabled = true;
        registry.save(&entry).await.unwrap();
        let reloaded =
            ScheduleStore::load(&*registry, crate::watchdog::WATCHDOG_ENTRY_NAME).await.unwrap();
        assert!(reloaded.enabled);

        let missing = ScheduleStore::load(&*registry, "no-such-entry").await.unwrap_err();
        assert!(matches!(missing, ScheduleError::MissingEntry(_)));
    }
}
