//! Record shaping
//!
//! Pure, deterministic transforms applied to raw provider items before
//! they are emitted: stripping volatile CDN query parameters so stable
//! fields stay stable across runs, and flattening nested money amounts
//! into top-level columns. Nothing here performs IO.

pub mod insights;

use crate::types::{JsonValue, ShapedRecord};
use serde_json::Value;

/// Query parameters whose values rotate between fetches of the same URL
const VOLATILE_MEDIA_PARAMS: &[&str] = &["_nc_rid"];
const VOLATILE_PROFILE_PARAMS: &[&str] = &["ccb"];

/// Strip the named query parameters from a URL, preserving everything else
///
/// Works on the raw string rather than a parsed URL so untouched
/// parameters keep their exact bytes and order; re-encoding could change
/// signed CDN URLs enough to invalidate them. Applying the same strip
/// twice is a no-op.
pub fn remove_params_from_url(url: &str, params: &[&str]) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match query.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (query, None),
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let name = pair.split('=').next().unwrap_or(pair);
            !params.contains(&name)
        })
        .collect();

    let mut out = String::from(base);
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Strip volatile CDN parameters from the URL fields of a media record
///
/// `media_url` rotates `_nc_rid` on video media; `profile_picture_url`
/// rotates `ccb`. Everything else in the record is untouched.
pub fn clear_media_urls(record: &mut ShapedRecord) {
    rewrite_url_field(record, "media_url", VOLATILE_MEDIA_PARAMS);
    rewrite_url_field(record, "profile_picture_url", VOLATILE_PROFILE_PARAMS);
}

fn rewrite_url_field(record: &mut ShapedRecord, field: &str, params: &[&str]) {
    if let Some(Value::String(url)) = record.get(field) {
        let cleaned = remove_params_from_url(url, params);
        record.insert(field.to_string(), Value::String(cleaned));
    }
}

/// Flatten a nested money object into `<field>_amount` / `<field>_currency`
///
/// The nested object is removed after flattening. Absent or non-object
/// values leave the record unchanged.
pub fn flatten_money(record: &mut ShapedRecord, field: &str) {
    let Some(Value::Object(money)) = record.remove(field) else {
        return;
    };
    if let Some(amount) = money.get("amount") {
        record.insert(format!("{field}_amount"), amount.clone());
    }
    if let Some(currency) = money.get("currency") {
        record.insert(format!("{field}_currency"), currency.clone());
    }
}

/// View a raw item as a shaped record, dropping non-object items
///
/// Providers occasionally slip nulls into record arrays; those are not
/// records and are filtered here rather than crashing downstream.
pub fn as_record(item: JsonValue) -> Option<ShapedRecord> {
    match item {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Attach the partition id to a record under the given key
pub fn tag_partition(record: &mut ShapedRecord, key: &str, partition: &str) {
    record.insert(key.to_string(), Value::String(partition.to_string()));
}

#[cfg(test)]
mod tests;
