//! Insight metric catalogs and response flattening
//!
//! The metric set a media object supports depends on its type, and the
//! provider rejects the whole insights call if any requested metric is
//! unsupported. The catalogs here are therefore exact allow-lists, not
//! suggestions.

use crate::types::{JsonValue, ShapedRecord};
use serde_json::Value;

/// Metrics valid for IMAGE and VIDEO media
pub const MEDIA_METRICS: &[&str] = &["engagement", "impressions", "reach", "saved"];

/// Metrics valid for CAROUSEL_ALBUM media (namespaced by the provider)
pub const CAROUSEL_ALBUM_METRICS: &[&str] = &[
    "carousel_album_engagement",
    "carousel_album_impressions",
    "carousel_album_reach",
    "carousel_album_saved",
];

/// Metrics valid for story media
pub const STORY_METRICS: &[&str] = &[
    "exits",
    "impressions",
    "reach",
    "replies",
    "taps_forward",
    "taps_back",
];

/// Lifetime audience-distribution metrics for the account
///
/// Distinct from the lifetime period group in [`METRICS_BY_PERIOD`]:
/// these describe who the audience is, not how a counter evolved.
pub const LIFETIME_METRICS: &[&str] = &[
    "audience_city",
    "audience_country",
    "audience_gender_age",
    "audience_locale",
];

/// Account-level metric catalogs, keyed by reporting period
pub const METRICS_BY_PERIOD: &[(&str, &[&str])] = &[
    (
        "day",
        &[
            "email_contacts",
            "follower_count",
            "get_directions_clicks",
            "impressions",
            "phone_call_clicks",
            "profile_views",
            "reach",
            "text_message_clicks",
            "website_clicks",
        ],
    ),
    ("week", &["impressions", "reach"]),
    ("days_28", &["impressions", "reach"]),
    ("lifetime", &["online_followers"]),
];

/// Media posted before the account became a business account; insights
/// are permanently unavailable for it and everything older.
pub const SUBCODE_PRE_BUSINESS_MEDIA: i64 = 2_108_006;

/// Not enough story viewers to report anything; the record is legitimately
/// empty, not an error.
pub const CODE_INSUFFICIENT_VIEWERS: i64 = 10;

/// Metric set to request for a media object of the given type
pub fn metrics_for_media(media_type: &str) -> Vec<&'static str> {
    match media_type {
        "VIDEO" => {
            let mut metrics = MEDIA_METRICS.to_vec();
            metrics.push("video_views");
            metrics
        }
        "CAROUSEL_ALBUM" => CAROUSEL_ALBUM_METRICS.to_vec(),
        _ => MEDIA_METRICS.to_vec(),
    }
}

/// Flatten a graph insights payload into record fields
///
/// The payload is a list of `{name, period, values: [{value, end_time}]}`
/// entries. Day-period metrics keep their bare name; other periods are
/// suffixed (`impressions_week`, `reach_days_28`) so one flat record can
/// carry all periods without collisions. The first entry's `end_time`
/// becomes the record's `date`.
pub fn flatten_insights(record: &mut ShapedRecord, insights: &JsonValue) {
    let Some(entries) = insights.as_array() else {
        return;
    };

    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let period = entry.get("period").and_then(Value::as_str).unwrap_or("day");
        let key = metric_key(name, period);

        let first = entry
            .get("values")
            .and_then(Value::as_array)
            .and_then(|values| values.first());
        let Some(first) = first else { continue };

        if !record.contains_key("date") {
            if let Some(end_time) = first.get("end_time") {
                record.insert("date".to_string(), end_time.clone());
            }
        }
        record.insert(key, first.get("value").cloned().unwrap_or(Value::Null));
    }
}

/// Flatten a media insights payload: one `{name, values: [{value}]}` entry
/// per requested metric, all single-period
pub fn flatten_media_insights(record: &mut ShapedRecord, insights: &JsonValue) {
    let Some(entries) = insights.as_array() else {
        return;
    };
    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let value = entry
            .get("values")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .and_then(|v| v.get("value"))
            .cloned()
            .unwrap_or(Value::Null);
        record.insert(name.to_string(), value);
    }
}

fn metric_key(name: &str, period: &str) -> String {
    match period {
        "week" | "days_28" => format!("{name}_{period}"),
        _ => name.to_string(),
    }
}
