use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Keyset position: the last row of the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub created: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // Serializing two plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::invalid_field("page[cursor]", "is not a valid cursor");
        let bytes = URL_SAFE_NO_PAD.decode(raw.trim()).map_err(|_| invalid())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid())
    }
}

/// Page links returned next to a list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Trim a fetched page of `size + 1` rows down to `size`, deriving the next cursor.
pub fn paginate<T>(mut rows: Vec<T>, size: i64, key: impl Fn(&T) -> Cursor) -> (Vec<T>, PageMeta) {
    let size = size.max(0) as usize;
    let has_more = rows.len() > size;
    rows.truncate(size);
    let next_cursor = if has_more {
        rows.last().map(|row| key(row).encode())
    } else {
        None
    };
    (rows, PageMeta { next_cursor, has_more })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_survives_encoding() {
        let cursor = Cursor {
            created: Utc::now(),
            id: Uuid::new_v4(),
        };
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn garbage_cursor_is_a_validation_failure() {
        let err = Cursor::decode("%%%").unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(Cursor::decode(&not_json).is_err());
    }

    #[test]
    fn extra_row_signals_another_page() {
        let now = Utc::now();
        let rows: Vec<(DateTime<Utc>, Uuid)> = (0..3).map(|_| (now, Uuid::new_v4())).collect();
        let last_kept = rows[1];

        let (page, meta) = paginate(rows, 2, |r| Cursor { created: r.0, id: r.1 });
        assert_eq!(page.len(), 2);
        assert!(meta.has_more);
        assert_eq!(Cursor::decode(&meta.next_cursor.unwrap()).unwrap().id, last_kept.1);

        let (page, meta) = paginate(page, 2, |r| Cursor { created: r.0, id: r.1 });
        assert_eq!(page.len(), 2);
        assert!(!meta.has_more);
        assert!(meta.next_cursor.is_none());
    }
}
