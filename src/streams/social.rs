//! Graph-style social streams
//!
//! Partitioned by connected business account. Media and story streams
//! are full refresh; account insights are incremental over day windows
//! because the provider only answers for a fixed trailing history.

use super::{emit_if_new, SourceStream, StreamDescriptor, SyncContext};
use crate::error::Result;
use crate::paginate::{paginate, PageRequest};
use crate::shape::insights::{
    flatten_insights, flatten_media_insights, metrics_for_media, CODE_INSUFFICIENT_VIEWERS,
    LIFETIME_METRICS, METRICS_BY_PERIOD, STORY_METRICS, SUBCODE_PRE_BUSINESS_MEDIA,
};
use crate::shape::{as_record, clear_media_urls, tag_partition};
use crate::types::{JsonObject, ShapedRecord};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use serde_json::Value;
use tracing::error;

/// Base URL for the given graph API version
pub fn graph_base_url(api_version: &str) -> String {
    format!("https://graph.facebook.com/{api_version}/")
}

/// The full social catalog
pub fn all() -> Vec<Box<dyn SourceStream>> {
    vec![
        Box::new(Users),
        Box::new(UserLifetimeInsights),
        Box::new(UserInsights),
        Box::new(Media),
        Box::new(Stories),
        Box::new(MediaInsights),
        Box::new(StoryInsights),
    ]
}

const USER_FIELDS: &[&str] = &[
    "id",
    "biography",
    "ig_id",
    "followers_count",
    "follows_count",
    "media_count",
    "name",
    "profile_picture_url",
    "username",
    "website",
];

const MEDIA_FIELDS: &[&str] = &[
    "caption",
    "comments_count",
    "id",
    "ig_id",
    "is_comment_enabled",
    "like_count",
    "media_type",
    "media_product_type",
    "media_url",
    "owner",
    "permalink",
    "shortcode",
    "thumbnail_url",
    "timestamp",
    "username",
    "children",
];

/// Fields the provider rejects when queried on a child of a carousel
const INVALID_CHILDREN_FIELDS: &[&str] = &[
    "caption",
    "comments_count",
    "is_comment_enabled",
    "like_count",
    "children",
];

const STORY_FIELDS: &[&str] = &[
    "caption",
    "id",
    "ig_id",
    "media_type",
    "media_product_type",
    "media_url",
    "owner",
    "permalink",
    "shortcode",
    "thumbnail_url",
    "timestamp",
    "username",
];

/// Queryable history horizon for account insights, in days
const INSIGHTS_LOOKBACK_DAYS: i64 = 29;

fn fields_param(fields: &[&str]) -> JsonObject {
    let mut params = JsonObject::new();
    params.insert("fields".to_string(), Value::String(fields.join(",")));
    params
}

fn tag_account(record: &mut ShapedRecord, account: &crate::client::Account) {
    tag_partition(record, "page_id", &account.page_id);
    tag_partition(record, "business_account_id", &account.account_id);
}

// ============================================================================
// Users
// ============================================================================

/// Account profile, one record per connected account
pub struct Users;

#[async_trait]
impl SourceStream for Users {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("users", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let body = ctx
                .client
                .get(&account.account_id, &fields_param(USER_FIELDS))
                .await?;
            let Some(mut record) = as_record(body) else {
                continue;
            };
            clear_media_urls(&mut record);
            tag_account(&mut record, &account);
            records.push(record);
        }
        Ok(records)
    }
}

// ============================================================================
// User lifetime insights
// ============================================================================

/// Lifetime audience metrics, one record per metric per account
pub struct UserLifetimeInsights;

#[async_trait]
impl SourceStream for UserLifetimeInsights {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh(
            "user_lifetime_insights",
            &["business_account_id", "metric"],
        )
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let mut params = JsonObject::new();
            params.insert(
                "metric".to_string(),
                Value::String(LIFETIME_METRICS.join(",")),
            );
            params.insert("period".to_string(), Value::String("lifetime".into()));

            let body = ctx
                .client
                .get(&format!("{}/insights", account.account_id), &params)
                .await?;
            let entries = body
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for entry in &entries {
                let first = entry
                    .get("values")
                    .and_then(Value::as_array)
                    .and_then(|values| values.first());
                let Some(first) = first else { continue };

                let mut record = ShapedRecord::new();
                tag_account(&mut record, &account);
                record.insert(
                    "metric".to_string(),
                    entry.get("name").cloned().unwrap_or(Value::Null),
                );
                record.insert(
                    "date".to_string(),
                    first.get("end_time").cloned().unwrap_or(Value::Null),
                );
                record.insert(
                    "value".to_string(),
                    first.get("value").cloned().unwrap_or(Value::Null),
                );
                records.push(record);
            }
        }
        Ok(records)
    }
}

// ============================================================================
// User insights (incremental, day-windowed)
// ============================================================================

/// Account metrics per day, incremental on `date`
///
/// The provider only answers for a trailing window, so each partition
/// reads day-sized windows from max(watermark, now minus the lookback)
/// through now. One request per period group per window; same-day
/// results merge into one record keyed by `date`.
pub struct UserInsights;

#[async_trait]
impl SourceStream for UserInsights {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::incremental("user_insights", &["business_account_id", "date"], "date")
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        let now = Utc::now();
        let horizon = now - Duration::days(INSIGHTS_LOOKBACK_DAYS);

        for account in ctx.accounts().await? {
            let mut since = std::cmp::max(ctx.state.watermark(&account.account_id), horizon);
            while since < now {
                let until = std::cmp::min(since + Duration::days(1), now);

                let mut record = ShapedRecord::new();
                for (period, metrics) in METRICS_BY_PERIOD {
                    let mut params = JsonObject::new();
                    params.insert("metric".to_string(), Value::String(metrics.join(",")));
                    params.insert("period".to_string(), Value::String((*period).to_string()));
                    params.insert("since".to_string(), Value::from(since.timestamp()));
                    params.insert("until".to_string(), Value::from(until.timestamp()));

                    let body = ctx
                        .client
                        .get(&format!("{}/insights", account.account_id), &params)
                        .await?;
                    if let Some(entries) = body.get("data") {
                        flatten_insights(&mut record, entries);
                    }
                }

                if !record.is_empty() {
                    tag_account(&mut record, &account);
                    emit_if_new(
                        &mut ctx.state,
                        &account.account_id,
                        "date",
                        record,
                        &mut records,
                    );
                }
                since = until;
            }
        }
        Ok(records)
    }
}

// ============================================================================
// Media
// ============================================================================

/// Published media, full refresh, children expanded
pub struct Media;

impl Media {
    /// Re-fetch each child with the fields valid on children, sanitized
    async fn expand_children(
        ctx: &SyncContext,
        record: &mut ShapedRecord,
    ) -> Result<()> {
        let child_ids: Vec<String> = record
            .get("children")
            .and_then(|c| c.get("data"))
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| c.get("id").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if child_ids.is_empty() {
            return Ok(());
        }

        let child_fields: Vec<&str> = MEDIA_FIELDS
            .iter()
            .copied()
            .filter(|f| !INVALID_CHILDREN_FIELDS.contains(f))
            .collect();

        let mut children = Vec::with_capacity(child_ids.len());
        for child_id in child_ids {
            let body = ctx.client.get(&child_id, &fields_param(&child_fields)).await?;
            if let Some(mut child) = as_record(body) {
                clear_media_urls(&mut child);
                children.push(Value::Object(child));
            }
        }
        record.insert("children".to_string(), Value::Array(children));
        Ok(())
    }
}

#[async_trait]
impl SourceStream for Media {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("media", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let request = PageRequest::get(format!("{}/media", account.account_id))
                .with_fields(MEDIA_FIELDS.iter().copied())
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

            for item in items {
                let Some(mut record) = as_record(item) else {
                    continue;
                };
                clear_media_urls(&mut record);
                if record.contains_key("children") {
                    Self::expand_children(ctx, &mut record).await?;
                }
                tag_account(&mut record, &account);
                records.push(record);
            }
        }
        Ok(records)
    }
}

// ============================================================================
// Stories
// ============================================================================

/// Active stories, full refresh
pub struct Stories;

#[async_trait]
impl SourceStream for Stories {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("stories", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let request = PageRequest::get(format!("{}/stories", account.account_id))
                .with_fields(STORY_FIELDS.iter().copied())
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

            for item in items {
                let Some(mut record) = as_record(item) else {
                    continue;
                };
                clear_media_urls(&mut record);
                tag_account(&mut record, &account);
                records.push(record);
            }
        }
        Ok(records)
    }
}

// ============================================================================
// Media insights
// ============================================================================

/// Per-media metrics, metric set chosen by media type
pub struct MediaInsights;

#[async_trait]
impl SourceStream for MediaInsights {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("media_insights", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let request = PageRequest::get(format!("{}/media", account.account_id))
                .with_fields(["media_type"])
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

            for item in items {
                let Some(media_id) = item.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let media_type = item
                    .get("media_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                let mut params = JsonObject::new();
                params.insert(
                    "metric".to_string(),
                    Value::String(metrics_for_media(media_type).join(",")),
                );

                let body = match ctx
                    .client
                    .get(&format!("{media_id}/insights"), &params)
                    .await
                {
                    Ok(body) => body,
                    // Everything older than this media predates the
                    // business account; skip the rest of the partition.
                    Err(err)
                        if err.api_error_subcode() == Some(SUBCODE_PRE_BUSINESS_MEDIA) =>
                    {
                        error!(
                            media_id,
                            account = %account.account_id,
                            "Media predates business account, stopping insights"
                        );
                        break;
                    }
                    Err(err) => return Err(err),
                };

                let mut record = ShapedRecord::new();
                record.insert("id".to_string(), Value::String(media_id.to_string()));
                tag_account(&mut record, &account);
                if let Some(entries) = body.get("data") {
                    flatten_media_insights(&mut record, entries);
                }
                records.push(record);
            }
        }
        Ok(records)
    }
}

// ============================================================================
// Story insights
// ============================================================================

/// Per-story metrics; stories with too few viewers report nothing
pub struct StoryInsights;

#[async_trait]
impl SourceStream for StoryInsights {
    fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::full_refresh("story_insights", &["id"])
    }

    async fn prepare(&self, ctx: &mut SyncContext) -> Result<()> {
        ctx.accounts().await.map(drop)
    }

    async fn read(&self, ctx: &mut SyncContext) -> Result<Vec<ShapedRecord>> {
        let mut records = Vec::new();
        for account in ctx.accounts().await? {
            let request = PageRequest::get(format!("{}/stories", account.account_id))
                .with_page_size(ctx.config.page_size);
            let items: Vec<Value> = paginate(ctx.client.clone(), request).try_collect().await?;

            for item in items {
                let Some(story_id) = item.get("id").and_then(Value::as_str) else {
                    continue;
                };

                let mut params = JsonObject::new();
                params.insert(
                    "metric".to_string(),
                    Value::String(STORY_METRICS.join(",")),
                );

                let body = match ctx
                    .client
                    .get(&format!("{story_id}/insights"), &params)
                    .await
                {
                    Ok(body) => body,
                    Err(err) if err.api_error_code() == Some(CODE_INSUFFICIENT_VIEWERS) => {
                        error!(story_id, "Not enough viewers for story insights");
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                let mut record = ShapedRecord::new();
                record.insert("id".to_string(), Value::String(story_id.to_string()));
                tag_account(&mut record, &account);
                if let Some(entries) = body.get("data") {
                    flatten_media_insights(&mut record, entries);
                }
                records.push(record);
            }
        }
        Ok(records)
    }
}
