//! Newest-first pagination with opaque cursors
//!
//! A cursor names the position *after* the last item of a page as the sort key
//! of that item plus how many items sharing that key were already returned.
//! Items appended after the first page carry newer keys and therefore never
//! shift the positions of older pages.

use std::cmp::Reverse;

use agrosmart_protocol::Page;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::StationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    /// Sort key of the last item returned
    before: i64,
    /// Items with key `before` already returned
    skip: usize,
}

impl Cursor {
    fn encode(&self) -> String {
        // Serializing two integers cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(token: &str) -> Result<Self, StationError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| StationError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StationError::InvalidCursor)
    }
}

/// Sort `items` newest first by `key` and cut one page starting at `next_token`.
///
/// Items with equal keys keep their input order.
pub fn paginate<T, K>(
    mut items: Vec<T>,
    key: K,
    limit: usize,
    next_token: Option<&str>,
) -> Result<Page<T>, StationError>
where
    K: Fn(&T) -> i64,
{
    items.sort_by_key(|item| Reverse(key(item)));
    let limit = limit.max(1);

    let start = match next_token {
        None => 0,
        Some(token) => {
            let cursor = Cursor::decode(token)?;
            let first = items
                .iter()
                .position(|item| key(item) <= cursor.before)
                .unwrap_or(items.len());
            let same_key = items[first..]
                .iter()
                .take_while(|item| key(item) == cursor.before)
                .count();
            first + cursor.skip.min(same_key)
        }
    };

    let end = (start + limit).min(items.len());
    let next_token = if end < items.len() {
        let before = key(&items[end - 1]);
        let skip = items[..end].iter().filter(|item| key(item) == before).count();
        Some(Cursor { before, skip }.encode())
    } else {
        None
    };

    let data = items.into_iter().skip(start).take(limit).collect();
    Ok(Page::new(data, next_token))
}
