//! Cursor pagination
//!
//! Drives repeated fetch-next-page calls against a cursor-bearing API and
//! exposes the result as a lazy, pull-based stream of raw items. The
//! stream holds exactly one fetched page: buffered items are yielded
//! first, and the next page is requested only when the buffer drains and
//! the completion flag is still unset. Consumer pull drives every fetch,
//! so a slow consumer never causes pages to pile up.
//!
//! The produced sequence is finite and one-shot per invocation. Any
//! exhausted retry from an underlying fetch ends page production; callers
//! must not assume further pages exist after an error.

use crate::client::GovernedClient;
use crate::error::Result;
use crate::types::{JsonObject, JsonValue, Method, RawItem};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Request describing one paginated read
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Path of the collection endpoint
    pub path: String,
    /// HTTP method
    pub method: Method,
    /// Base request parameters, merged into every page fetch
    pub params: JsonObject,
    /// Fields requested per item (sent as a comma-joined `fields` param)
    pub fields: Vec<String>,
    /// Records requested per page
    pub page_size: u32,
    /// Field holding the record array; `None` means top-level `data`
    pub records_field: Option<String>,
    /// Parameter name carrying the page token on follow-up fetches
    pub cursor_param: String,
}

impl PageRequest {
    /// A GET page request with default pagination parameters
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            params: JsonObject::new(),
            fields: Vec::new(),
            page_size: 100,
            records_field: None,
            cursor_param: "after".to_string(),
        }
    }

    /// A POST page request (search-style endpoints)
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            cursor_param: "cursor".to_string(),
            ..Self::get(path)
        }
    }

    /// Merge base parameters
    #[must_use]
    pub fn with_params(mut self, params: JsonObject) -> Self {
        self.params.extend(params);
        self
    }

    /// Set the requested fields
    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the field holding the record array
    #[must_use]
    pub fn with_records_field(mut self, field: impl Into<String>) -> Self {
        self.records_field = Some(field.into());
        self
    }

    /// Set the page-token parameter name
    #[must_use]
    pub fn with_cursor_param(mut self, param: impl Into<String>) -> Self {
        self.cursor_param = param.into();
        self
    }

    /// Parameters for one page fetch
    fn page_params(&self, after: Option<&str>) -> JsonObject {
        let mut params = self.params.clone();
        if !self.fields.is_empty() {
            params.insert(
                "fields".to_string(),
                Value::String(self.fields.join(",")),
            );
        }
        params.insert("limit".to_string(), Value::from(self.page_size));
        if let Some(after) = after {
            params.insert(self.cursor_param.clone(), Value::String(after.to_string()));
        }
        params
    }
}

/// One fetched page: ready buffer, next-page token, completion flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Items fetched but not yet yielded
    pub items: VecDeque<RawItem>,
    /// Opaque token identifying the next page
    pub after: Option<String>,
    /// Set when the provider signalled exhaustion
    pub finished: bool,
}

impl PageCursor {
    /// Parse a page out of a response body
    ///
    /// Understands the graph shape (`paging.next` + `paging.cursors.after`)
    /// and the flat shape (top-level `cursor` token). An absent token
    /// means the sequence is complete.
    pub fn parse(body: &JsonValue, records_field: Option<&str>) -> Self {
        let field = records_field.unwrap_or("data");
        let items: VecDeque<RawItem> = body
            .get(field)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into();

        if let Some(paging) = body.get("paging") {
            let has_next = paging.get("next").and_then(Value::as_str).is_some();
            let after = paging
                .get("cursors")
                .and_then(|c| c.get("after"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            let finished = !has_next || after.is_none();
            return Self {
                items,
                after: if finished { None } else { after },
                finished,
            };
        }

        let after = body
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string);
        Self {
            finished: after.is_none(),
            items,
            after,
        }
    }
}

enum PageState {
    Start,
    Draining(PageCursor),
}

/// Produce the lazy item sequence for a page request
///
/// No item is skipped or duplicated across page boundaries; the stream
/// stops requesting pages the moment the completion flag is observed.
pub fn paginate(
    client: Arc<GovernedClient>,
    request: PageRequest,
) -> BoxStream<'static, Result<RawItem>> {
    stream::try_unfold(
        (client, request, PageState::Start),
        |(client, request, state)| async move {
            let mut state = state;
            loop {
                match state {
                    PageState::Start => {
                        let params = request.page_params(None);
                        let body = client.call(request.method, &request.path, &params).await?;
                        state =
                            PageState::Draining(PageCursor::parse(&body, request.records_field.as_deref()));
                    }
                    PageState::Draining(mut cursor) => {
                        if let Some(item) = cursor.items.pop_front() {
                            return Ok(Some((item, (client, request, PageState::Draining(cursor)))));
                        }
                        if cursor.finished {
                            return Ok(None);
                        }
                        let params = request.page_params(cursor.after.as_deref());
                        let body = client.call(request.method, &request.path, &params).await?;
                        let next = PageCursor::parse(&body, request.records_field.as_deref());
                        // A provider echoing the same token with an empty
                        // buffer would otherwise spin forever.
                        if next.items.is_empty() && next.after == cursor.after {
                            return Ok(None);
                        }
                        state = PageState::Draining(next);
                    }
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests;
