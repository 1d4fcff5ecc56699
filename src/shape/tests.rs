//! Shaping tests: URL sanitization, money flattening, insight catalogs

use super::insights::*;
use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn record(value: serde_json::Value) -> ShapedRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// ============================================================================
// URL sanitization
// ============================================================================

#[test]
fn test_remove_params_strips_only_named() {
    let url = "https://cdn.example.net/v/video.mp4?_nc_rid=abc123&_nc_cat=108&oe=60F1E2";
    let cleaned = remove_params_from_url(url, &["_nc_rid"]);
    assert_eq!(
        cleaned,
        "https://cdn.example.net/v/video.mp4?_nc_cat=108&oe=60F1E2"
    );
}

#[test]
fn test_remove_params_preserves_order_and_bytes() {
    // untouched parameters keep their exact encoding and order
    let url = "https://cdn.example.net/p?b=2&ccb=7-4&a=%2Fsigned%3D&z=last";
    let cleaned = remove_params_from_url(url, &["ccb"]);
    assert_eq!(cleaned, "https://cdn.example.net/p?b=2&a=%2Fsigned%3D&z=last");
}

#[test_case("https://cdn.example.net/v/video.mp4" ; "no query")]
#[test_case("https://cdn.example.net/v?_nc_cat=1" ; "param absent")]
#[test_case("https://cdn.example.net/v?a=1#frag" ; "fragment")]
fn test_remove_params_is_idempotent(url: &str) {
    let once = remove_params_from_url(url, &["_nc_rid"]);
    let twice = remove_params_from_url(&once, &["_nc_rid"]);
    assert_eq!(once, twice);
    assert_eq!(once, url);
}

#[test]
fn test_remove_params_drops_dangling_question_mark() {
    let cleaned = remove_params_from_url("https://x.test/v?_nc_rid=only", &["_nc_rid"]);
    assert_eq!(cleaned, "https://x.test/v");
}

#[test]
fn test_clear_media_urls() {
    let mut rec = record(json!({
        "id": "m1",
        "media_url": "https://cdn.example.net/v.mp4?_nc_rid=rotates&oe=keep",
        "profile_picture_url": "https://cdn.example.net/p.jpg?ccb=7-4&stp=keep",
        "permalink": "https://example.net/p/abc/?taken_by=me",
    }));
    clear_media_urls(&mut rec);

    assert_eq!(rec["media_url"], "https://cdn.example.net/v.mp4?oe=keep");
    assert_eq!(
        rec["profile_picture_url"],
        "https://cdn.example.net/p.jpg?stp=keep"
    );
    // other URL fields are left alone
    assert_eq!(rec["permalink"], "https://example.net/p/abc/?taken_by=me");
}

// ============================================================================
// Money flattening
// ============================================================================

#[test]
fn test_flatten_money() {
    let mut rec = record(json!({
        "id": "w1",
        "hourly_rate": { "amount": 1500, "currency": "USD" },
    }));
    flatten_money(&mut rec, "hourly_rate");

    assert_eq!(rec["hourly_rate_amount"], 1500);
    assert_eq!(rec["hourly_rate_currency"], "USD");
    assert!(!rec.contains_key("hourly_rate"));
}

#[test]
fn test_flatten_money_absent_field_is_noop() {
    let mut rec = record(json!({ "id": "w1" }));
    flatten_money(&mut rec, "hourly_rate");
    assert_eq!(rec, record(json!({ "id": "w1" })));
}

// ============================================================================
// Insight catalogs
// ============================================================================

#[test]
fn test_metrics_for_video_adds_video_views() {
    let metrics = metrics_for_media("VIDEO");
    assert_eq!(
        metrics,
        vec!["engagement", "impressions", "reach", "saved", "video_views"]
    );
}

#[test]
fn test_metrics_for_carousel_album_are_namespaced() {
    assert_eq!(metrics_for_media("CAROUSEL_ALBUM"), CAROUSEL_ALBUM_METRICS);
}

#[test]
fn test_metrics_for_image_is_base_set() {
    assert_eq!(metrics_for_media("IMAGE"), MEDIA_METRICS);
}

#[test]
fn test_metrics_by_period_covers_all_periods() {
    let periods: Vec<&str> = METRICS_BY_PERIOD.iter().map(|(p, _)| *p).collect();
    assert_eq!(periods, vec!["day", "week", "days_28", "lifetime"]);
}

// ============================================================================
// Insight flattening
// ============================================================================

#[test]
fn test_flatten_insights_period_suffixes() {
    let insights = json!([
        {
            "name": "impressions",
            "period": "day",
            "values": [{ "value": 10, "end_time": "2021-01-05T08:00:00+0000" }],
        },
        {
            "name": "impressions",
            "period": "week",
            "values": [{ "value": 70, "end_time": "2021-01-05T08:00:00+0000" }],
        },
        {
            "name": "reach",
            "period": "days_28",
            "values": [{ "value": 280, "end_time": "2021-01-05T08:00:00+0000" }],
        },
    ]);

    let mut rec = ShapedRecord::new();
    flatten_insights(&mut rec, &insights);

    assert_eq!(rec["impressions"], 10);
    assert_eq!(rec["impressions_week"], 70);
    assert_eq!(rec["reach_days_28"], 280);
    assert_eq!(rec["date"], "2021-01-05T08:00:00+0000");
}

#[test]
fn test_flatten_insights_skips_empty_values() {
    let insights = json!([
        { "name": "online_followers", "period": "lifetime", "values": [] },
    ]);
    let mut rec = ShapedRecord::new();
    flatten_insights(&mut rec, &insights);
    assert!(rec.is_empty());
}

#[test]
fn test_flatten_media_insights() {
    let insights = json!([
        { "name": "engagement", "values": [{ "value": 5 }] },
        { "name": "video_views", "values": [{ "value": 123 }] },
    ]);
    let mut rec = record(json!({ "id": "m1" }));
    flatten_media_insights(&mut rec, &insights);

    assert_eq!(rec["engagement"], 5);
    assert_eq!(rec["video_views"], 123);
    assert_eq!(rec["id"], "m1");
}

// ============================================================================
// Record helpers
// ============================================================================

#[test]
fn test_as_record_drops_non_objects() {
    assert!(as_record(json!({ "id": 1 })).is_some());
    assert!(as_record(json!(null)).is_none());
    assert!(as_record(json!([1, 2])).is_none());
}

#[test]
fn test_tag_partition() {
    let mut rec = ShapedRecord::new();
    tag_partition(&mut rec, "business_account_id", "acct_1");
    assert_eq!(rec["business_account_id"], "acct_1");
}
