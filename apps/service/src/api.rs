//! Typed operations consumed by the HTTP layer.
//!
//! Everything here returns domain results and [`ApiError`]s; routing and
//! request/response marshaling live outside this crate. API writes never
//! touch `status` or the probe timestamps.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::database::models::{Service, ServiceDefinition, ServiceStatus};
use crate::database::{ScheduleStore, ServiceStore};
use crate::error::ApiError;
use crate::pagination::{ListQuery, Paginator};
use crate::validation::{ServicePatch, ServicePayload, validate_payload};
use crate::watchdog::WatchdogEntry;

/// Listing response: one page plus collection-level counters and the
/// boundary cursors as record ids.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceListing {
    pub services: Vec<Service>,
    pub services_total: u64,
    pub services_up: u64,
    pub cursors: Cursors,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cursors {
    pub before: Option<i64>,
    pub after: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogToggle {
    Changed,
    AlreadyInState,
}

/// The service-registry and watchdog operations surface.
pub struct Api {
    registry: Arc<dyn ServiceStore>,
    schedules: Arc<dyn ScheduleStore>,
    paginator: Paginator,
}

impl Api {
    pub fn new(
        registry: Arc<dyn ServiceStore>,
        schedules: Arc<dyn ScheduleStore>,
        default_page_limit: u32,
    ) -> Self {
        let paginator = Paginator::new(registry.clone(), default_page_limit);
        Self { registry, schedules, paginator }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<ServiceListing, ApiError> {
        let page = self.paginator.page(query).await?;
        let services_up = self.registry.count_with_status(ServiceStatus::Up).await?;
        Ok(ServiceListing {
            services_total: page.total,
            services_up,
            cursors: Cursors {
                before: page.before.map(|s| s.id),
                after: page.after.map(|s| s.id),
            },
            services: page.items,
        })
    }

    pub async fn create(&self, payload: &ServicePayload) -> Result<Service, ApiError> {
        let definition = validate_payload(payload).map_err(ApiError::Validation)?;
        self.ensure_name_free(&definition.name, None).await?;

        let service = self.registry.insert(&definition).await?;
        info!(service = %service.name, id = service.id, "service created");
        Ok(service)
    }

    pub async fn get(&self, id: i64) -> Result<Service, ApiError> {
        self.registry.get(id).await?.ok_or_else(|| ApiError::missing_service(id))
    }

    /// Full replace of the mutable fields; `status` and the probe
    /// timestamps survive untouched.
    pub async fn replace(&self, id: i64, payload: &ServicePayload) -> Result<Service, ApiError> {
        let current = self.get(id).await?;
        let definition = validate_payload(payload).map_err(ApiError::Validation)?;
        self.ensure_name_free(&definition.name, Some(current.id)).await?;

        self.registry.update_definition(id, &definition, Utc::now()).await?;
        self.get(id).await
    }

    /// Partial update: absent fields keep their stored value, `edited` is
    /// bumped either way.
    pub async fn patch(&self, id: i64, patch: &ServicePatch) -> Result<Service, ApiError> {
        let current = self.get(id).await?;
        let current_definition = ServiceDefinition {
            name: current.name.clone(),
            host: current.host.clone(),
            port: current.port.clone(),
            proto: current.proto,
        };
        let merged = patch.apply_to(&current_definition);
        let definition = validate_payload(&merged).map_err(ApiError::Validation)?;
        self.ensure_name_free(&definition.name, Some(current.id)).await?;

        self.registry.update_definition(id, &definition, Utc::now()).await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        if !self.registry.delete(id).await? {
            return Err(ApiError::missing_service(id));
        }
        info!(id, "service deleted");
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<u64, ApiError> {
        let deleted = self.registry.delete_all().await?;
        info!(deleted, "all services deleted");
        Ok(deleted)
    }

    /// Whether the watchdog is currently enabled. Schedule unavailability
    /// surfaces as its own error, distinct from "off".
    pub async fn watchdog_status(&self) -> Result<bool, ApiError> {
        let entry = WatchdogEntry::load(self.schedules.clone()).await?;
        Ok(entry.enabled())
    }

    pub async fn set_watchdog(&self, command: WatchdogCommand) -> Result<WatchdogToggle, ApiError> {
        let mut entry = WatchdogEntry::load(self.schedules.clone()).await?;
        let desired = command == WatchdogCommand::Start;

        if entry.enabled() == desired {
            return Ok(WatchdogToggle::AlreadyInState);
        }
        if desired {
            entry.enable().await?;
        } else {
            entry.disable().await?;
        }
        info!(enabled = desired, "watchdog toggled");
        Ok(WatchdogToggle::Changed)
    }

    /// Duplicate names surface as a conflict on the `name` field. The
    /// registry's unique index backs this check against races.
    async fn ensure_name_free(&self, name: &str, own_id: Option<i64>) -> Result<(), ApiError> {
        match self.registry.get_by_name(name).await? {
            Some(existing) if Some(existing.id) != own_id => {
                Err(ApiError::Conflict { field: "name" })
            }
            _ => Ok(()),
        }
    }
}
