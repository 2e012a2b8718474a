//! Input validation shared by the HTTP surface and the message router.

use std::collections::HashSet;

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_CONTENT_BYTES};
use crate::error::ValidationError;
use crate::types::MessageId;

/// Content must be present and within the size limit. Whitespace-only
/// content is accepted as-is.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::Empty("content"));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(ValidationError::TooLong {
            field: "content",
            len: content.len(),
            max: MAX_CONTENT_BYTES,
        });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::Empty("username"));
    }
    if username.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "username",
            len: username.len(),
            max: 64,
        });
    }
    Ok(())
}

/// Keep the well-formed ids, dropping malformed ones and duplicates.
/// Fails only when nothing usable is left.
pub fn parse_message_ids<S: AsRef<str>>(raw: &[S]) -> Result<Vec<MessageId>, ValidationError> {
    let mut seen = HashSet::new();
    let ids: Vec<MessageId> = raw
        .iter()
        .filter_map(|s| MessageId::from_hex(s.as_ref()).ok())
        .filter(|id| seen.insert(*id))
        .collect();

    if ids.is_empty() {
        return Err(ValidationError::NoValidIds);
    }
    Ok(ids)
}

/// Page window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub skip: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            skip: 0,
        }
    }
}

impl Pagination {
    /// Lenient parse: anything that is not a positive `limit` or a
    /// non-negative `skip` falls back to the default for that field.
    pub fn from_query(limit: Option<&str>, skip: Option<&str>) -> Self {
        let mut page = Self::default();

        if let Some(limit) = limit.and_then(|l| l.trim().parse::<i64>().ok()) {
            if limit > 0 {
                page.limit = limit.min(u32::MAX as i64) as u32;
            }
        }

        if let Some(skip) = skip.and_then(|s| s.trim().parse::<i64>().ok()) {
            if skip >= 0 {
                page.skip = skip.min(u32::MAX as i64) as u32;
            }
        }

        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_rules() {
        assert!(validate_content("hi").is_ok());
        assert_eq!(validate_content(""), Err(ValidationError::Empty("content")));
        assert!(validate_content("   ").is_ok());
        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(matches!(
            validate_content(&big),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_message_ids_filters_malformed() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        let raw = vec![a.to_hex(), "not-a-hex".to_string(), b.to_hex(), a.to_hex()];

        let ids = parse_message_ids(&raw).unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_parse_message_ids_all_malformed() {
        assert_eq!(
            parse_message_ids(&["not-a-hex"]),
            Err(ValidationError::NoValidIds)
        );
        let empty: [&str; 0] = [];
        assert_eq!(parse_message_ids(&empty), Err(ValidationError::NoValidIds));
    }

    #[test]
    fn test_pagination_defaults_and_leniency() {
        assert_eq!(Pagination::from_query(None, None), Pagination::default());
        assert_eq!(Pagination::from_query(Some("0"), Some("-3")), Pagination::default());
        assert_eq!(Pagination::from_query(Some("abc"), Some("x")), Pagination::default());

        let page = Pagination::from_query(Some("5"), Some("10"));
        assert_eq!(page, Pagination { limit: 5, skip: 10 });

        // Any positive limit is honoured.
        let page = Pagination::from_query(Some("5000"), None);
        assert_eq!(page.limit, 5000);
    }
}
