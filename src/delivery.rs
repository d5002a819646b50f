//! Отправка следующего невыданного прогноза и запись о выдаче.

use std::future::Future;

use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use teloxide::RequestError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::db::{Db, StoreError};
use crate::forecast::{ForecastItem, Payload};
use crate::tracker::MarkOutcome;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] RequestError),
    #[error("payload rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("forecast was not sent")]
    Send(#[source] NotifyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent(ForecastItem),
    /// Для этого пользователя в категории больше ничего нет.
    Exhausted,
}

/// Канал доставки пользователю. `Ok` значит, что платформа приняла сообщение.
pub trait Notifier {
    fn send(
        &self,
        user_id: i64,
        item: &ForecastItem,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn title(item: &ForecastItem) -> String {
    format!("Прогноз по {}", item.category.label())
}

impl Notifier for TelegramNotifier {
    async fn send(&self, user_id: i64, item: &ForecastItem) -> Result<(), NotifyError> {
        let chat = ChatId(user_id);
        match &item.payload {
            Payload::Photo { file_id, caption } => {
                let caption = match caption {
                    Some(extra) => format!("{}\n\n{}", title(item), extra),
                    None => title(item),
                };
                self.bot
                    .send_photo(chat, InputFile::file_id(FileId(file_id.clone())))
                    .caption(caption)
                    .await?;
            }
            Payload::File { path } => {
                if tokio::fs::metadata(path).await.is_err() {
                    return Err(NotifyError::Rejected(format!("missing file {}", path)));
                }
                self.bot
                    .send_photo(chat, InputFile::file(path.clone()))
                    .caption(title(item))
                    .await?;
            }
            Payload::Text { body } => {
                self.bot
                    .send_message(chat, format!("{}\n\n{}", title(item), body))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Отправляет самый старый прогноз категории, ещё не выданный `user_id`.
///
/// Запись о выдаче делается только после подтверждённой отправки:
/// при ошибке прогноз останется доступным для следующей попытки.
pub async fn deliver_next<N: Notifier>(
    db: &Db,
    notifier: &N,
    user_id: i64,
    category: &Category,
) -> Result<DeliveryOutcome, DeliveryError> {
    let Some(item) = db.available(user_id, category).await?.into_iter().next() else {
        debug!(user_id, category = %category, "delivery: nothing left");
        return Ok(DeliveryOutcome::Exhausted);
    };

    notifier
        .send(user_id, &item)
        .await
        .map_err(DeliveryError::Send)?;

    match db.mark_delivered(user_id, item.id).await {
        Ok(MarkOutcome::Marked) => {
            info!(user_id, category = %category, item_id = item.id, "delivery: sent");
        }
        Ok(MarkOutcome::AlreadyMarked) => {
            debug!(user_id, item_id = item.id, "delivery: already recorded");
        }
        // прогноз удалён во время отправки, но пользователь его уже получил
        Err(StoreError::ItemNotFound(id)) => {
            warn!(user_id, item_id = id, "delivery: item vanished before it was recorded");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(DeliveryOutcome::Sent(item))
}
