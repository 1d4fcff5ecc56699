//! Flat-cursor commerce streams
//!
//! Partitioned by location. The provider uses a top-level `cursor` token
//! for pagination and a sandbox host for test accounts.

use super::{emit_if_new, SourceStream, StreamDescriptor, SyncContext};
use crate::error::Result;
use crate::paginate::{paginate, PageRequest};
use crate::shape::{as_record, flatten_money};
use crate::types::{JsonObject, ShapedRecord};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde_json::{json, Value};

/// Base URL for the production or sandbox environment
pub fn base_url(is_sandbox: bool) -> &'static str {
    if is_sandbox {
        "https://connect.squareupsandbox.com/"
    } else {
        "https://connect.squareup.com/"
    }
}

/// The full commerce catalog
pub fn all() -> Vec<Box<dyn SourceStream>> {
    vec![
        Box::new(Locations),
        Box::new(CatalogObjects::new("items", "ITEM")),
        Box::new(CatalogObjects::new("categories", "CATEGORY")),
        Box::new(CatalogObjects::new("discounts", "DISCOUNT")),
        Box::new(CatalogObjects::new("taxes", "TAX")),
        Box::new(Orders),
        Box::new(Payments),
        Box::new(TeamMemberWages),
    ]
}

/// The search endpoint rejects more location ids than this per request
const ORDERS_LOCATIONS_PER_REQUEST: usize = 10;

// ============================================================================
// Locations
// ============================================================================

/// Seller locations, full refresh, single page
pub struct Locations;

#[async_trait]
impl SourceStream for Locations {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("locations", &["id"])
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let body = ctx.client.get("v2/locations", &JsonObject::new()).await?;
        let records = body
            .get("locations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(as_record)
            .collect();
        Ok(records)
    }
}

// ============================================================================
// Catalog objects
// ============================================================================

/// Catalog objects of one type, incremental on `updated_at`
///
/// One stream per object type; the type discriminator is the only thing
/// that differs between them, so they share this definition. The
/// partition key is the stream name, since the catalog is not scoped to
/// a location.
pub struct CatalogObjects {
    name: &'static str,
    object_type: &'static str,
}

impl CatalogObjects {
    /// A catalog stream for the given object type
    pub const fn new(name: &'static str, object_type: &'static str) -> Self {
        Self { name, object_type }
    }
}

#[async_trait]
impl SourceStream for CatalogObjects {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::incremental(self.name, &["id"], "updated_at")
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let begin = ctx.state.watermark(self.name);

        let mut params = JsonObject::new();
        params.insert("object_types".to_string(), json!([self.object_type]));
        params.insert(
            "include_deleted_objects".to_string(),
            Value::Bool(ctx.config.include_deleted),
        );
        params.insert("begin_time".to_string(), Value::String(begin.to_rfc3339()));

        let request = PageRequest::post("v2/catalog/search")
            .with_params(params)
            .with_records_field("objects")
            .with_page_size(ctx.config.page_size);
        let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

        let mut records = Vec::new();
        for item in items {
            let Some(record) = as_record(item) else {
                continue;
            };
            emit_if_new(&mut ctx.state, self.name, "updated_at", record, &mut records);
        }
        Ok(records)
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Orders across all locations, searched in location batches
///
/// The deleted-history toggle is expressed as an explicit state
/// allow-list rather than a provider-side boolean, so what the stream
/// asks for is always visible in the request.
pub struct Orders;

impl Orders {
    fn order_states(include_deleted: bool) -> Vec<&'static str> {
        let mut states = vec!["OPEN", "COMPLETED"];
        if include_deleted {
            states.extend(["CANCELED", "DRAFT"]);
        }
        states
    }
}

#[async_trait]
impl SourceStream for Orders {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("orders", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.locations().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let locations = ctx.locations().await?;
        let states = Self::order_states(ctx.config.include_deleted);

        let mut records = Vec::new();
        for batch in locations.chunks(ORDERS_LOCATIONS_PER_REQUEST) {
            let mut params = JsonObject::new();
            params.insert("location_ids".to_string(), json!(batch));
            params.insert(
                "query".to_string(),
                json!({ "filter": { "state_filter": { "states": states } } }),
            );

            let request = PageRequest::post("v2/orders/search")
                .with_params(params)
                .with_records_field("orders")
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;
            records.extend(items.into_iter().filter_map(as_record));
        }
        Ok(records)
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Payments per location, incremental on `created_at`
pub struct Payments;

#[async_trait]
impl SourceStream for Payments {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::incremental("payments", &["id"], "created_at")
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.locations().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let locations = ctx.locations().await?;

        let mut records = Vec::new();
        for location in locations {
            let begin = ctx.state.watermark(&location);

            let mut params = JsonObject::new();
            params.insert("location_id".to_string(), Value::String(location.clone()));
            params.insert("begin_time".to_string(), Value::String(begin.to_rfc3339()));
            params.insert("sort_order".to_string(), Value::String("ASC".into()));

            let request = PageRequest::get("v2/payments")
                .with_params(params)
                .with_records_field("payments")
                .with_cursor_param("cursor")
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

            for item in items {
                let Some(record) = as_record(item) else {
                    continue;
                };
                emit_if_new(&mut ctx.state, &location, "created_at", record, &mut records);
            }
        }
        Ok(records)
    }
}

// ============================================================================
// Team member wages
// ============================================================================

/// Wage entries, full refresh, nested money flattened
pub struct TeamMemberWages;

#[async_trait]
impl SourceStream for TeamMemberWages {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("team_member_wages", &["id"])
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let request = PageRequest::get("v2/labor/team-member-wages")
            .with_records_field("team_member_wages")
            .with_cursor_param("cursor")
            .with_page_size(ctx.config.page_size);
        let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

        let mut records = Vec::new();
        for item in items {
            let Some(mut record) = as_record(item) else {
                continue;
            };
            flatten_money(&mut record, "hourly_rate");
            records.push(record);
        }
        Ok(records)
    }
}
