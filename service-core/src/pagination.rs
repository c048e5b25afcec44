//! Page-size clamping and the opaque page-token codec used by every list call.
//!
//! A page token has the form `<session uuid>-<page number>`. Callers treat it
//! as opaque and hand it back unchanged to fetch the following page.

use crate::error::AppError;

/// Page size used when the request leaves it unset.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound for a single page.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`, defaulting zero or
/// negative values.
pub fn page_size(requested: i32) -> i64 {
    let requested = i64::from(requested);
    if requested <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.min(MAX_PAGE_SIZE)
    }
}

/// Prefix shared by every token issued to a session.
pub fn page_prefix(session_uuid: &str) -> String {
    format!("{}-", session_uuid)
}

/// Encode the token pointing at `page_number`.
pub fn encode_page_token(session_uuid: &str, page_number: i64) -> String {
    format!("{}{}", page_prefix(session_uuid), page_number)
}

fn invalid_token() -> AppError {
    AppError::InvalidArgument(anyhow::anyhow!("Invalid page_token"))
}

/// Decode a page token back into a 1-based page number.
///
/// An empty token is the first page. A token issued for this session yields
/// its trailing number; a bare number is accepted too.
pub fn decode_page_number(session_uuid: &str, page_token: &str) -> Result<i64, AppError> {
    let token = page_token.trim();
    if token.is_empty() {
        return Ok(1);
    }

    let prefix = page_prefix(session_uuid);
    let number = token.strip_prefix(prefix.as_str()).unwrap_or(token);
    let page = number.parse::<i64>().map_err(|_| invalid_token())?;

    Ok(page.max(1))
}

/// Resolved page position for one list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_number: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Build from the raw `page_size` and `page_token` request fields.
    pub fn from_request(
        session_uuid: &str,
        page_size_requested: i32,
        page_token: &str,
    ) -> Result<Self, AppError> {
        let page_number = decode_page_number(session_uuid, page_token)?;
        let limit = page_size(page_size_requested);
        // the page end must fit in an i64 OFFSET
        (page_number - 1)
            .checked_mul(limit)
            .and_then(|offset| offset.checked_add(limit))
            .ok_or_else(invalid_token)?;
        Ok(Self { page_number, limit })
    }

    /// Build a page request covering everything from the first row.
    pub fn first(limit: i64) -> Self {
        Self {
            page_number: 1,
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page_number - 1) * self.limit
    }

    /// Whether rows exist beyond this page.
    pub fn has_next(&self, record_count: i64) -> bool {
        self.offset().saturating_add(self.limit) < record_count
    }

    /// Token for the following page, or empty when this page is the last one.
    pub fn next_page_token(&self, session_uuid: &str, record_count: i64) -> String {
        if self.has_next(record_count) {
            encode_page_token(session_uuid, self.page_number + 1)
        } else {
            String::new()
        }
    }
}

/// One page of converted records plus the bookkeeping every list response carries.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub record_count: i64,
    pub next_page_token: String,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, record_count: i64, next_page_token: String) -> Self {
        Self {
            records,
            record_count,
            next_page_token,
        }
    }

    /// Convert every record, keeping the counts and token.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            record_count: self.record_count,
            next_page_token: self.next_page_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "0b6f0c7e-93e5-4c0c-9d4a-1f3f6b0a1c55";

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(page_size(-7), DEFAULT_PAGE_SIZE);
        assert_eq!(page_size(25), 25);
        assert_eq!(page_size(10_000), MAX_PAGE_SIZE);
    }

    #[test]
    fn empty_token_is_first_page() {
        assert_eq!(decode_page_number(SESSION, "").unwrap(), 1);
        assert_eq!(decode_page_number(SESSION, "   ").unwrap(), 1);
    }

    #[test]
    fn token_round_trips_through_the_session_prefix() {
        let token = encode_page_token(SESSION, 3);
        assert_eq!(token, format!("{}-3", SESSION));
        assert_eq!(decode_page_number(SESSION, &token).unwrap(), 3);
    }

    #[test]
    fn bare_numbers_are_accepted() {
        assert_eq!(decode_page_number(SESSION, "4").unwrap(), 4);
        assert_eq!(decode_page_number(SESSION, "0").unwrap(), 1);
    }

    #[test]
    fn foreign_or_garbage_tokens_are_rejected() {
        let foreign = encode_page_token("another-session", 2);
        assert!(matches!(
            decode_page_number(SESSION, &foreign),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(decode_page_number(SESSION, "next").is_err());
    }

    #[test]
    fn offset_follows_page_number() {
        let page = PageRequest::from_request(SESSION, 20, &encode_page_token(SESSION, 3)).unwrap();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn next_token_only_when_rows_remain() {
        let page = PageRequest::from_request(SESSION, 10, "").unwrap();
        assert_eq!(page.next_page_token(SESSION, 10), "");
        assert_eq!(page.next_page_token(SESSION, 5), "");
        assert_eq!(page.next_page_token(SESSION, 11), encode_page_token(SESSION, 2));

        let second = PageRequest::from_request(SESSION, 10, &encode_page_token(SESSION, 2)).unwrap();
        assert_eq!(second.next_page_token(SESSION, 20), "");
        assert_eq!(second.next_page_token(SESSION, 21), encode_page_token(SESSION, 3));
    }

    #[test]
    fn page_numbers_past_the_offset_range_are_rejected() {
        let session_token = encode_page_token(SESSION, i64::MAX / 10);
        for token in ["9223372036854775807", session_token.as_str()] {
            assert!(matches!(
                PageRequest::from_request(SESSION, 50, token),
                Err(AppError::InvalidArgument(_))
            ));
        }

        let far = PageRequest::from_request(SESSION, 10, "1000000").unwrap();
        assert_eq!(far.offset(), 9_999_990);
        assert_eq!(far.next_page_token(SESSION, 10), "");
    }

    #[test]
    fn page_map_keeps_bookkeeping() {
        let page = Page::new(vec![1, 2, 3], 9, "t".to_string()).map(|n| n * 10);
        assert_eq!(page.records, vec![10, 20, 30]);
        assert_eq!(page.record_count, 9);
        assert_eq!(page.next_page_token, "t");
    }
}
