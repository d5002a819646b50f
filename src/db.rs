use thiserror::Error;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

use crate::category::Category;
use crate::forecast::{now_ts, ForecastItem, Payload};

/// Ошибки хранилища. `DuplicateDelivery` ошибкой не считается, см. `MarkOutcome`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] tokio_rusqlite::Error),
    #[error("forecast {0} not found")]
    ItemNotFound(i64),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
/// Открывает (или создаёт) базу SQLite по пути `path` и гарантирует наличие схемы.
    pub async fn open(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path).await?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

/// База в памяти, для тестов.
    #[cfg(test)]
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

/// Инициализирует схему БД (идемпотентно):
/// - `forecasts`  — прогнозы по категориям, `id` задаёт порядок выдачи;
/// - `deliveries` — кому какой прогноз уже отправлен, удаляется каскадом;
/// - `imported_files` — реестр импортированных файлов по (категория, SHA-256),
///   переживает очистку прогнозов;
/// - `texts`      — текущий текстовый прогноз по категории;
/// - `users`      — первый и последний визит пользователя.
    async fn init(&self) -> StoreResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode = WAL;
                    PRAGMA foreign_keys = ON;
                    CREATE TABLE IF NOT EXISTS forecasts (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        category TEXT NOT NULL,
                        kind TEXT NOT NULL,
                        content TEXT NOT NULL,
                        caption TEXT,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS forecasts_by_category ON forecasts(category, id);
                    CREATE TABLE IF NOT EXISTS deliveries (
                        user_id INTEGER NOT NULL,
                        forecast_id INTEGER NOT NULL REFERENCES forecasts(id) ON DELETE CASCADE,
                        delivered_at INTEGER NOT NULL,
                        PRIMARY KEY (user_id, forecast_id)
                    );
                    CREATE INDEX IF NOT EXISTS deliveries_by_forecast ON deliveries(forecast_id);
                    CREATE TABLE IF NOT EXISTS imported_files (
                        category TEXT NOT NULL,
                        hash TEXT NOT NULL,
                        path TEXT NOT NULL,
                        imported_at INTEGER NOT NULL,
                        PRIMARY KEY (category, hash)
                    );
                    CREATE TABLE IF NOT EXISTS texts (
                        category TEXT PRIMARY KEY,
                        body TEXT NOT NULL,
                        updated_at INTEGER NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS users (
                        user_id INTEGER PRIMARY KEY,
                        first_seen INTEGER NOT NULL,
                        last_seen INTEGER NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Отмечает визит пользователя: создаёт запись или обновляет `last_seen`.
    pub async fn touch_user(&self, user_id: i64) -> StoreResult<()> {
        let now = now_ts();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users(user_id, first_seen, last_seen) VALUES(?1, ?2, ?2) \
                     ON CONFLICT(user_id) DO UPDATE SET last_seen = excluded.last_seen",
                    rusqlite::params![user_id, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn user_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .await?;
        Ok(n as u64)
    }
}

/// Собирает `ForecastItem` из строки `id, category, kind, content, caption, created_at`.
pub(crate) fn read_forecast(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForecastItem> {
    let kind: String = row.get(2)?;
    let payload = Payload::from_parts(&kind, row.get(3)?, row.get(4)?).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "kind".to_string(), rusqlite::types::Type::Text)
    })?;
    let created_at: i64 = row.get(5)?;
    Ok(ForecastItem {
        id: row.get(0)?,
        category: Category::from_stored(row.get(1)?),
        payload,
        created_at: OffsetDateTime::from_unix_timestamp(created_at)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH),
    })
}
