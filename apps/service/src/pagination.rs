//! Cursor-based pagination over the service registry.
//!
//! Cursors are record ids marking the window boundaries: `after` resumes
//! strictly beyond a record, `before` selects the window ending just
//! before one. The sort key is restricted to an allow-list; a leading `-`
//! requests descending order.

use std::sync::Arc;

use crate::database::models::Service;
use crate::database::{ServiceStore, SortDir, SortField};
use crate::error::{ApiError, FieldErrors};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub dir: SortDir,
}

impl Default for Sort {
    fn default() -> Self {
        Self { field: SortField::Id, dir: SortDir::Asc }
    }
}

impl Sort {
    /// Parse a requested sort key, e.g. `name` or `-id`. Only the fields
    /// in the allow-list are accepted.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (dir, field_name) = match raw.strip_prefix('-') {
            Some(rest) => (SortDir::Desc, rest),
            None => (SortDir::Asc, raw),
        };
        let field = match field_name {
            "id" => SortField::Id,
            "name" => SortField::Name,
            other => return Err(format!("Cannot sort by '{other}'. Use id or name")),
        };
        Ok(Self { field, dir })
    }
}

/// Raw listing query as the HTTP layer hands it over.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

/// Where the requested window starts, resolved during query validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    First,
    After(i64),
    Before(i64),
}

/// One window over the collection, in page order, plus boundary cursors.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Service>,
    /// Full collection count at query time, counted independently of the
    /// window read (eventual consistency is accepted).
    pub total: u64,
    /// Last record of the page, present only when records exist strictly
    /// beyond it.
    pub after: Option<Service>,
    /// First record of the page, present only when records exist strictly
    /// before it.
    pub before: Option<Service>,
}

pub struct Paginator {
    registry: Arc<dyn ServiceStore>,
    default_limit: u32,
}

impl Paginator {
    pub fn new(registry: Arc<dyn ServiceStore>, default_limit: u32) -> Self {
        Self { registry, default_limit }
    }

    pub async fn page(&self, query: &ListQuery) -> Result<Page, ApiError> {
        let mut errors = FieldErrors::new();

        let window = match (query.after, query.before) {
            (None, None) => Window::First,
            (Some(id), None) => Window::After(id),
            (None, Some(id)) => Window::Before(id),
            (Some(_), Some(_)) => {
                errors
                    .entry("cursor".into())
                    .or_default()
                    .push("after and before are mutually exclusive".into());
                Window::First
            }
        };

        let sort = match query.sort.as_deref() {
            None | Some("") => Sort::default(),
            Some(raw) => match Sort::parse(raw) {
                Ok(sort) => sort,
                Err(message) => {
                    errors.entry("sort".into()).or_default().push(message);
                    Sort::default()
                }
            },
        };

        let limit = query.limit.unwrap_or(self.default_limit);
        if limit == 0 {
            errors.entry("limit".into()).or_default().push("limit must be at least 1".into());
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let items = match window {
            Window::First => self.registry.window(sort.field, sort.dir, None, limit).await?,
            Window::After(id) => {
                let anchor = self.anchor(id).await?;
                self.registry.window(sort.field, sort.dir, Some(&anchor), limit).await?
            }
            Window::Before(id) => {
                // Scan backwards from the anchor, then flip the window
                // back into page order.
                let anchor = self.anchor(id).await?;
                let mut items = self
                    .registry
                    .window(sort.field, sort.dir.reversed(), Some(&anchor), limit)
                    .await?;
                items.reverse();
                items
            }
        };

        let after = match items.last() {
            Some(last) if self.registry.exists_beyond(sort.field, sort.dir, last).await? => {
                Some(last.clone())
            }
            _ => None,
        };
        let before = match items.first() {
            Some(first)
                if self
                    .registry
                    .exists_beyond(sort.field, sort.dir.reversed(), first)
                    .await? =>
            {
                Some(first.clone())
            }
            _ => None,
        };

        let total = self.registry.count().await?;

        Ok(Page { items, total, after, before })
    }

    /// A cursor referencing a missing record is rejected before any
    /// windowing happens: no such cursor must never mean "unbounded page".
    async fn anchor(&self, id: i64) -> Result<Service, ApiError> {
        self.registry.get(id).await?.ok_or_else(|| ApiError::missing_service(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Host, HostKind, Proto, ServiceDefinition};
    use crate::database::testutil::test_registry;

    async fn seeded_paginator(names: &[&str]) -> (Paginator, Vec<Service>, tempfile::TempDir) {
        let (registry, dir) = test_registry().await;
        let mut created = Vec::new();
        for name in names {
            let definition = ServiceDefinition {
                name: name.to_string(),
                host: Host { kind: HostKind::Ip, value: "10.0.0.1".into() },
                port: "80".into(),
                proto: Proto::Tcp,
            };
            created.push(registry.insert(&definition).await.unwrap());
        }
        (Paginator::new(registry, DEFAULT_PAGE_LIMIT), created, dir)
    }

    fn ids(page: &Page) -> Vec<i64> {
        page.items.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn first_page_over_six_services() {
        let (paginator, created, _dir) =
            seeded_paginator(&["a", "b", "c", "d", "e", "f"]).await;

        let query = ListQuery { limit: Some(2), ..Default::default() };
        let page = paginator.page(&query).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 6);
        assert_eq!(page.after.as_ref().map(|s| s.id), Some(created[1].id));
        assert!(page.before.is_none());
    }

    #[tokio::test]
    async fn following_the_after_cursor_reproduces_the_next_page() {
        let (paginator, created, _dir) =
            seeded_paginator(&["a", "b", "c", "d", "e", "f"]).await;

        let mut seen = Vec::new();
        let mut cursor: Option<i64> = None;
        loop {
            let query = ListQuery { after: cursor, limit: Some(2), ..Default::default() };
            let page = paginator.page(&query).await.unwrap();
            seen.extend(ids(&page));
            match page.after {
                Some(boundary) => cursor = Some(boundary.id),
                None => break,
            }
        }

        let expected: Vec<i64> = created.iter().map(|s| s.id).collect();
        // No duplicates, no skips, whole collection covered.
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn before_cursor_window_is_presented_in_page_order() {
        let (paginator, created, _dir) =
            seeded_paginator(&["a", "b", "c", "d", "e", "f"]).await;

        let query = ListQuery {
            before: Some(created[4].id),
            limit: Some(2),
            ..Default::default()
        };
        let page = paginator.page(&query).await.unwrap();

        // The two records immediately preceding "e", in ascending order.
        assert_eq!(ids(&page), vec![created[2].id, created[3].id]);
        assert_eq!(page.before.as_ref().map(|s| s.id), Some(created[2].id));
        assert_eq!(page.after.as_ref().map(|s| s.id), Some(created[3].id));
    }

    #[tokio::test]
    async fn last_page_has_no_after_cursor() {
        let (paginator, created, _dir) = seeded_paginator(&["a", "b", "c"]).await;

        let query = ListQuery {
            after: Some(created[1].id),
            limit: Some(2),
            ..Default::default()
        };
        let page = paginator.page(&query).await.unwrap();
        assert_eq!(ids(&page), vec![created[2].id]);
        assert!(page.after.is_none());
        assert_eq!(page.before.as_ref().map(|s| s.id), Some(created[2].id));
    }

    #[tokio::test]
    async fn descending_name_sort() {
        let (paginator, _created, _dir) = seeded_paginator(&["alpha", "beta", "gamma"]).await;

        let query = ListQuery { sort: Some("-name".into()), ..Default::default() };
        let page = paginator.page(&query).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["gamma", "beta", "alpha"]);
    }

    #[tokio::test]
    async fn both_cursors_is_a_validation_error() {
        let (paginator, created, _dir) = seeded_paginator(&["a", "b"]).await;

        let query = ListQuery {
            after: Some(created[0].id),
            before: Some(created[1].id),
            ..Default::default()
        };
        let err = paginator.page(&query).await.unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.contains_key("cursor")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_sort_field_is_a_validation_error() {
        let (paginator, _created, _dir) = seeded_paginator(&["a"]).await;

        let query = ListQuery { sort: Some("port".into()), ..Default::default() };
        let err = paginator.page(&query).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn dangling_cursor_is_rejected_deterministically() {
        let (paginator, created, _dir) = seeded_paginator(&["a", "b"]).await;

        let missing = created.last().unwrap().id + 100;
        let query = ListQuery { after: Some(missing), ..Default::default() };
        let err = paginator.page(&query).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_collection_yields_an_empty_page() {
        let (paginator, _created, _dir) = seeded_paginator(&[]).await;

        let page = paginator.page(&ListQuery::default()).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert!(page.after.is_none());
        assert!(page.before.is_none());
    }
}
