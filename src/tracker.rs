//! Журнал выдачи по пользователям: что осталось отправить и что уже отправлено.

use rusqlite::OptionalExtension;

use crate::category::Category;
use crate::db::{read_forecast, Db, StoreError, StoreResult};
use crate::forecast::{now_ts, ForecastItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    /// Запись для этой пары уже была, ничего не записано.
    AlreadyMarked,
}

enum Insert {
    Done(MarkOutcome),
    Missing,
}

impl Db {
    /// Прогнозы категории, ещё не выданные `user_id`, от старых к новым.
    pub async fn available(&self, user_id: i64, category: &Category) -> StoreResult<Vec<ForecastItem>> {
        let key = category.key().to_string();
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT f.id, f.category, f.kind, f.content, f.caption, f.created_at \
                     FROM forecasts f \
                     WHERE f.category = ?1 AND NOT EXISTS ( \
                         SELECT 1 FROM deliveries d WHERE d.forecast_id = f.id AND d.user_id = ?2) \
                     ORDER BY f.id",
                )?;
                let items = stmt
                    .query_map(rusqlite::params![key, user_id], read_forecast)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Число невыданных прогнозов по категориям, в переданном порядке.
    pub async fn available_counts(
        &self,
        user_id: i64,
        categories: &[Category],
    ) -> StoreResult<Vec<(Category, usize)>> {
        let counts: Vec<(String, i64)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT f.category, COUNT(*) FROM forecasts f \
                     WHERE NOT EXISTS ( \
                         SELECT 1 FROM deliveries d WHERE d.forecast_id = f.id AND d.user_id = ?1) \
                     GROUP BY f.category",
                )?;
                let rows = stmt
                    .query_map([user_id], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(categories
            .iter()
            .map(|c| {
                let n = counts
                    .iter()
                    .find(|(key, _)| key == c.key())
                    .map_or(0, |(_, n)| *n as usize);
                (c.clone(), n)
            })
            .collect())
    }

    /// Отмечает, что `item_id` выдан `user_id`. Повторный вызов безопасен.
    ///
    /// Вызывать только после подтверждённой отправки. Если прогноз успели
    /// удалить, вернёт [`StoreError::ItemNotFound`].
    pub async fn mark_delivered(&self, user_id: i64, item_id: i64) -> StoreResult<MarkOutcome> {
        let now = now_ts();
        let res = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists = tx
                    .query_row("SELECT 1 FROM forecasts WHERE id = ?1", [item_id], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(Insert::Missing);
                }
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO deliveries(user_id, forecast_id, delivered_at) \
                     VALUES(?1, ?2, ?3)",
                    rusqlite::params![user_id, item_id, now],
                )?;
                tx.commit()?;
                Ok(Insert::Done(if inserted == 1 {
                    MarkOutcome::Marked
                } else {
                    MarkOutcome::AlreadyMarked
                }))
            })
            .await?;
        match res {
            Insert::Done(outcome) => Ok(outcome),
            Insert::Missing => Err(StoreError::ItemNotFound(item_id)),
        }
    }

    pub async fn delivery_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM deliveries", [], |r| r.get(0))?))
            .await?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategorySet;
    use crate::forecast::Payload;

    fn text(body: &str) -> Payload {
        Payload::Text { body: body.to_string() }
    }

    fn ids(items: &[ForecastItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    async fn football_with_two() -> (Db, Category, i64, i64) {
        let db = Db::open_in_memory().await.unwrap();
        let set = CategorySet::new(&["football", "tennis"]).unwrap();
        let football = set.get("football").unwrap().clone();
        let a = db.upload(&football, text("A")).await.unwrap();
        let b = db.upload(&football, text("B")).await.unwrap();
        (db, football, a, b)
    }

    #[tokio::test]
    async fn single_user_scenario() {
        let (db, football, a, b) = football_with_two().await;

        assert_eq!(ids(&db.available(42, &football).await.unwrap()), vec![a, b]);

        assert_eq!(db.mark_delivered(42, a).await.unwrap(), MarkOutcome::Marked);
        assert_eq!(ids(&db.available(42, &football).await.unwrap()), vec![b]);

        assert_eq!(
            db.mark_delivered(42, a).await.unwrap(),
            MarkOutcome::AlreadyMarked
        );
        assert_eq!(db.delivery_count().await.unwrap(), 1);
        assert_eq!(ids(&db.available(42, &football).await.unwrap()), vec![b]);
    }

    #[tokio::test]
    async fn items_are_shared_between_users() {
        let (db, football, a, b) = football_with_two().await;

        assert_eq!(ids(&db.available(1, &football).await.unwrap()), vec![a, b]);
        assert_eq!(ids(&db.available(2, &football).await.unwrap()), vec![a, b]);

        assert_eq!(db.mark_delivered(1, a).await.unwrap(), MarkOutcome::Marked);
        assert_eq!(db.mark_delivered(2, a).await.unwrap(), MarkOutcome::Marked);
        assert_eq!(db.delivery_count().await.unwrap(), 2);
        assert_eq!(ids(&db.available(1, &football).await.unwrap()), vec![b]);
        assert_eq!(ids(&db.available(2, &football).await.unwrap()), vec![b]);
    }

    #[tokio::test]
    async fn available_is_fifo_and_scoped_to_category() {
        let db = Db::open_in_memory().await.unwrap();
        let set = CategorySet::new(&["football", "tennis"]).unwrap();
        let football = set.get("football").unwrap().clone();
        let tennis = set.get("tennis").unwrap().clone();

        let older = db.upload(&football, text("older")).await.unwrap();
        let other = db.upload(&tennis, text("tennis")).await.unwrap();
        let newer = db.upload(&football, text("newer")).await.unwrap();

        let items = db.available(5, &football).await.unwrap();
        assert_eq!(ids(&items), vec![older, newer]);
        assert_eq!(items[0].payload, text("older"));
        assert!(items.iter().all(|i| i.category == football));
        assert_eq!(ids(&db.available(5, &tennis).await.unwrap()), vec![other]);
    }

    #[tokio::test]
    async fn delivered_items_never_reappear() {
        let (db, football, a, b) = football_with_two().await;
        db.mark_delivered(7, b).await.unwrap();
        let left = db.available(7, &football).await.unwrap();
        assert_eq!(ids(&left), vec![a]);
        db.mark_delivered(7, a).await.unwrap();
        assert!(db.available(7, &football).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn marking_a_cleared_item_reports_not_found() {
        let (db, football, a, _) = football_with_two().await;
        db.clear_category(&football).await.unwrap();
        let err = db.mark_delivered(42, a).await.unwrap_err();
        assert!(matches!(err, StoreError::ItemNotFound(id) if id == a));
        assert_eq!(db.delivery_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counts_cover_every_category() {
        let (db, football, a, _) = football_with_two().await;
        let set = CategorySet::new(&["football", "tennis"]).unwrap();
        db.mark_delivered(3, a).await.unwrap();

        let counts = db.available_counts(3, set.as_slice()).await.unwrap();
        let view: Vec<(&str, usize)> = counts.iter().map(|(c, n)| (c.key(), *n)).collect();
        assert_eq!(view, vec![("football", 1), ("tennis", 0)]);

        let fresh = db.available_counts(4, set.as_slice()).await.unwrap();
        assert_eq!(fresh[0], (football, 2));
    }
}
