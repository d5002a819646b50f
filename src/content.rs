//! Админская часть хранилища: загрузка, очистка, текстовые прогнозы и статистика.

use rusqlite::OptionalExtension;

use crate::category::{Category, CategorySet};
use crate::db::{Db, StoreResult};
use crate::forecast::{now_ts, Payload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub users: u64,
    pub deliveries: u64,
    pub items_per_category: Vec<(Category, u64)>,
}

impl Db {
    /// Создаёт прогноз и возвращает его `id`.
    pub async fn upload(&self, category: &Category, payload: Payload) -> StoreResult<i64> {
        let key = category.key().to_string();
        let now = now_ts();
        let id = self
            .conn
            .call(move |conn| {
                let (kind, content, caption) = payload.to_parts();
                conn.execute(
                    "INSERT INTO forecasts(category, kind, content, caption, created_at) \
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![key, kind, content, caption, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Как [`Db::upload`], но файл с хэшем `hash`, уже импортированный в эту
    /// категорию, повторно не добавляется. Учёт ведётся в `imported_files`,
    /// которую очистка категории не трогает: удалённые прогнозы не вернутся
    /// при следующем импорте. Для дубликата возвращает `None`.
    pub async fn upload_hashed(
        &self,
        category: &Category,
        payload: Payload,
        hash: &str,
    ) -> StoreResult<Option<i64>> {
        let key = category.key().to_string();
        let hash = hash.to_string();
        let now = now_ts();
        let id = self
            .conn
            .call(move |conn| {
                let (kind, content, caption) = payload.to_parts();
                let tx = conn.transaction()?;
                let fresh = tx.execute(
                    "INSERT OR IGNORE INTO imported_files(category, hash, path, imported_at) \
                     VALUES(?1, ?2, ?3, ?4)",
                    rusqlite::params![key, hash, content, now],
                )?;
                if fresh == 0 {
                    return Ok(None);
                }
                tx.execute(
                    "INSERT INTO forecasts(category, kind, content, caption, created_at) \
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![key, kind, content, caption, now],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(Some(id))
            })
            .await?;
        Ok(id)
    }

    /// Удаляет все прогнозы категории, записи о выдаче удаляются каскадом.
    pub async fn clear_category(&self, category: &Category) -> StoreResult<usize> {
        let key = category.key().to_string();
        let n = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM forecasts WHERE category = ?1", [key])?))
            .await?;
        Ok(n)
    }

    pub async fn clear_all(&self) -> StoreResult<usize> {
        let n = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM forecasts", [])?))
            .await?;
        Ok(n)
    }

    /// Заменяет текущий текстовый прогноз категории.
    pub async fn set_text(&self, category: &Category, body: &str) -> StoreResult<()> {
        let key = category.key().to_string();
        let body = body.to_string();
        let now = now_ts();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO texts(category, body, updated_at) VALUES(?1, ?2, ?3) \
                     ON CONFLICT(category) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                    rusqlite::params![key, body, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn text(&self, category: &Category) -> StoreResult<Option<String>> {
        let key = category.key().to_string();
        let body = self
            .conn
            .call(move |conn| {
                let body = conn
                    .query_row("SELECT body FROM texts WHERE category = ?1", [key], |r| {
                        r.get::<_, String>(0)
                    })
                    .optional()?;
                Ok(body)
            })
            .await?;
        Ok(body)
    }

    pub async fn clear_text(&self, category: &Category) -> StoreResult<bool> {
        let key = category.key().to_string();
        let n = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM texts WHERE category = ?1", [key])?))
            .await?;
        Ok(n > 0)
    }

    /// Текущие тексты настроенных категорий, в порядке конфигурации.
    pub async fn texts(&self, categories: &CategorySet) -> StoreResult<Vec<(Category, String)>> {
        let rows: Vec<(String, String)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT category, body FROM texts")?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(categories
            .iter()
            .filter_map(|c| {
                rows.iter()
                    .find(|(key, _)| key == c.key())
                    .map(|(_, body)| (c.clone(), body.clone()))
            })
            .collect())
    }

    pub async fn stats(&self, categories: &CategorySet) -> StoreResult<Stats> {
        let per_category: Vec<(String, i64)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM forecasts GROUP BY category")?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        let items_per_category = categories
            .iter()
            .map(|c| {
                let n = per_category
                    .iter()
                    .find(|(key, _)| key == c.key())
                    .map_or(0, |(_, n)| *n as u64);
                (c.clone(), n)
            })
            .collect();
        Ok(Stats {
            users: self.user_count().await?,
            deliveries: self.delivery_count().await?,
            items_per_category,
        })
    }
}
