//! Resource Fetcher
//!
//! Drives list/describe calls through all pages. Records are streamed as each
//! page arrives so node construction can start before the listing finishes.

use super::catalog::PaginationDef;
use crate::error::{InventoryError, Result};
use crate::provider::ApiClient;
use async_stream::try_stream;
use futures::Stream;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Where the next page starts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cursor {
    pub token: String,
    /// Secondary cursor fields, already keyed by their request names
    pub carried: Map<String, Value>,
}

impl Cursor {
    /// Text identifying this position; equal keys mean the provider looped
    fn key(&self) -> String {
        if self.carried.is_empty() {
            self.token.clone()
        } else {
            format!("{} {}", self.token, Value::Object(self.carried.clone()))
        }
    }
}

/// Result of one page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<Cursor>,
}

/// Fetch one page
pub async fn fetch_page(
    client: &dyn ApiClient,
    operation: &str,
    params: &Value,
    response_path: &str,
    pagination: Option<&PaginationDef>,
    cursor: Option<&Cursor>,
) -> Result<Page> {
    let mut params = params.clone();
    if params.is_null() {
        params = Value::Object(Map::new());
    }

    // Add page token
    if let (Some(cursor), Some(pagination)) = (cursor, pagination) {
        match params {
            Value::Object(ref mut map) => {
                map.insert(
                    pagination.request_token.clone(),
                    Value::String(cursor.token.clone()),
                );
                map.extend(cursor.carried.clone());
            }
            _ => {
                return Err(InventoryError::MalformedResponse {
                    operation: operation.to_string(),
                    reason: "request parameters must be an object".to_string(),
                })
            }
        }
    }

    let response = client.call(operation, &params).await?;

    let items = extract_items(&response, response_path);
    let next = pagination.and_then(|p| next_cursor(&response, p));

    Ok(Page { items, next })
}

/// Continuation of a response, `None` once the provider signals the end
fn next_cursor(response: &Value, pagination: &PaginationDef) -> Option<Cursor> {
    if let Some(ref flag) = pagination.more_flag {
        if response.get(flag).and_then(|v| v.as_bool()) != Some(true) {
            return None;
        }
    }

    let token = response
        .get(&pagination.response_token)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())?;

    let carried = pagination
        .carry
        .iter()
        .filter_map(|field| {
            response
                .get(&field.response)
                .filter(|v| !v.is_null())
                .map(|v| (field.request.clone(), v.clone()))
        })
        .collect();

    Some(Cursor {
        token: token.to_string(),
        carried,
    })
}

/// Stream every record of a listing, page by page
///
/// Ends when a response carries no token (or its more-pages flag is not
/// `true`). A token returned twice is an error rather than an endless loop.
pub fn paginate(
    client: Arc<dyn ApiClient>,
    operation: String,
    params: Value,
    response_path: String,
    pagination: Option<PaginationDef>,
) -> impl Stream<Item = Result<Value>> + Send {
    try_stream! {
        let mut cursor: Option<Cursor> = None;
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let page = fetch_page(
                client.as_ref(),
                &operation,
                &params,
                &response_path,
                pagination.as_ref(),
                cursor.as_ref(),
            )
            .await?;

            for item in page.items {
                yield item;
            }

            let Some(next) = page.next else {
                break;
            };
            if !seen.insert(next.key()) {
                Err::<(), _>(InventoryError::RepeatedToken {
                    operation: operation.clone(),
                    token: next.token,
                })?;
                break;
            }
            cursor = Some(next);
        }
    }
}

/// Fetch all records (auto-paginate)
pub async fn fetch_all_pages(
    client: Arc<dyn ApiClient>,
    operation: &str,
    params: &Value,
    response_path: &str,
    pagination: Option<&PaginationDef>,
) -> Result<Vec<Value>> {
    use futures::TryStreamExt;

    paginate(
        client,
        operation.to_string(),
        params.clone(),
        response_path.to_string(),
        pagination.cloned(),
    )
    .try_collect()
    .await
}

/// Extract items from response using the response_path
///
/// A `*` segment flattens an array, so `Reservations.*.Instances` yields the
/// instances of every reservation in order.
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current: Vec<&Value> = vec![response];
    for part in path.split('.') {
        current = if part == "*" {
            current
                .into_iter()
                .filter_map(|v| v.as_array())
                .flatten()
                .collect()
        } else {
            current.into_iter().filter_map(|v| v.get(part)).collect()
        };
    }

    current
        .into_iter()
        .filter_map(|v| v.as_array())
        .flatten()
        .cloned()
        .collect()
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(item);
    }

    let mut current = item;
    for part in path.split('.') {
        // Handle array index
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}
