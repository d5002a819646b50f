use time::OffsetDateTime;

use crate::category::Category;

/// Содержимое прогноза.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Фото, уже загруженное на серверы Telegram.
    Photo { file_id: String, caption: Option<String> },
    /// Картинка, импортированная из папки прогнозов.
    File { path: String },
    Text { body: String },
}

impl Payload {
    /// Представление для БД: `(kind, content, caption)`.
    pub(crate) fn to_parts(&self) -> (&'static str, &str, Option<&str>) {
        match self {
            Payload::Photo { file_id, caption } => ("photo", file_id, caption.as_deref()),
            Payload::File { path } => ("file", path, None),
            Payload::Text { body } => ("text", body, None),
        }
    }

    pub(crate) fn from_parts(kind: &str, content: String, caption: Option<String>) -> Option<Self> {
        match kind {
            "photo" => Some(Payload::Photo { file_id: content, caption }),
            "file" => Some(Payload::File { path: content }),
            "text" => Some(Payload::Text { body: content }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastItem {
    pub id: i64,
    pub category: Category,
    pub payload: Payload,
    pub created_at: OffsetDateTime,
}

pub(crate) fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
