use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, PhotoSize};
use teloxide::utils::command::BotCommands as _;
use tracing::{debug, info, warn};

use crate::category::{Category, CategorySet};
use crate::config::Config;
use crate::content::Stats;
use crate::db::Db;
use crate::delivery::{deliver_next, DeliveryError, DeliveryOutcome, TelegramNotifier};
use crate::forecast::Payload;
use crate::import::import_dir;
use crate::keyboards::{
    admin_categories_keyboard, admin_panel_keyboard, categories_keyboard, parse_callback,
    start_keyboard, CallbackAction, ADMIN_TEXT, CATEGORIES_TEXT, START_TEXT,
};

pub type HandlerResult = anyhow::Result<()>;
pub type AdminDialogue = Dialogue<AdminState, InMemStorage<AdminState>>;

pub struct AppContext {
    pub config: Config,
    pub categories: CategorySet,
    pub db: Db,
    pub notifier: TelegramNotifier,
}

type SharedContext = Arc<AppContext>;

/// Состояние диалога админа, хранится только в памяти.
#[derive(Clone, Debug, Default)]
pub enum AdminState {
    #[default]
    Idle,
    AwaitingPayload,
    AwaitingCategory {
        payload: Payload,
    },
    AwaitingText {
        category: Category,
    },
}

#[derive(Debug, teloxide::macros::BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum BotCommand {
    #[command(description = "Показать помощь")]
    Help,
    #[command(description = "Начать")]
    Start,
    #[command(description = "Выбрать категорию прогноза")]
    Forecasts,
    #[command(description = "Админ-панель")]
    Admin,
    #[command(description = "Отменить текущее действие")]
    Cancel,
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    let messages = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<AdminState>, AdminState>()
        .branch(
            dptree::entry()
                .filter_command::<BotCommand>()
                .endpoint(handle_command),
        )
        .branch(dptree::case![AdminState::AwaitingPayload].endpoint(receive_payload))
        .branch(dptree::case![AdminState::AwaitingText { category }].endpoint(receive_text));

    let callbacks = Update::filter_callback_query()
        .enter_dialogue::<CallbackQuery, InMemStorage<AdminState>, AdminState>()
        .endpoint(handle_callback);

    dptree::entry().branch(messages).branch(callbacks)
}

fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|u| u.id.0 as i64)
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    ctx: SharedContext,
    dialogue: AdminDialogue,
) -> HandlerResult {
    let user_id = sender_id(&msg);
    info!(chat_id = %msg.chat.id, from = ?user_id, command = ?cmd, "Command received");
    if let Some(id) = user_id {
        ctx.db.touch_user(id).await?;
    }
    match cmd {
        BotCommand::Help => {
            bot.send_message(msg.chat.id, BotCommand::descriptions().to_string())
                .await?;
        }
        BotCommand::Start => {
            bot.send_message(msg.chat.id, START_TEXT)
                .reply_markup(start_keyboard())
                .await?;
        }
        BotCommand::Forecasts => {
            let Some(id) = user_id else { return Ok(()) };
            send_categories(&bot, &ctx, msg.chat.id, id).await?;
        }
        BotCommand::Admin => match user_id {
            Some(id) if ctx.config.is_admin(id) => {
                bot.send_message(msg.chat.id, ADMIN_TEXT)
                    .reply_markup(admin_panel_keyboard())
                    .await?;
            }
            _ => warn!(chat_id = %msg.chat.id, from = ?user_id, "Admin panel denied"),
        },
        BotCommand::Cancel => {
            dialogue.exit().await?;
            bot.send_message(msg.chat.id, "Отменено.").await?;
        }
    }
    Ok(())
}

/// Отправляет клавиатуру категорий со счётчиками, посчитанными заново.
async fn send_categories(bot: &Bot, ctx: &AppContext, chat: ChatId, user_id: i64) -> HandlerResult {
    let counts = ctx
        .db
        .available_counts(user_id, ctx.categories.as_slice())
        .await?;
    let with_text: Vec<Category> = ctx
        .db
        .texts(&ctx.categories)
        .await?
        .into_iter()
        .map(|(c, _)| c)
        .collect();
    debug!(user_id, "Sending categories");
    bot.send_message(chat, CATEGORIES_TEXT)
        .reply_markup(categories_keyboard(&counts, &with_text))
        .await?;
    Ok(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    ctx: SharedContext,
    dialogue: AdminDialogue,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(data) = q.data.as_deref() else { return Ok(()) };

    let user_id = q.from.id.0 as i64;
    let chat = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user_id));
    ctx.db.touch_user(user_id).await?;

    let action = parse_callback(data);
    debug!(user_id, ?action, "Callback received");
    match action {
        CallbackAction::ShowStart => {
            bot.send_message(chat, START_TEXT)
                .reply_markup(start_keyboard())
                .await?;
        }
        CallbackAction::ShowCategories => send_categories(&bot, &ctx, chat, user_id).await?,
        CallbackAction::Noop => {}
        CallbackAction::Deliver(key) => {
            let Some(category) = ctx.categories.get(&key) else {
                warn!(user_id, key = %key, "Unknown category requested");
                return Ok(());
            };
            match deliver_next(&ctx.db, &ctx.notifier, user_id, category).await {
                Ok(DeliveryOutcome::Sent(_)) => {}
                Ok(DeliveryOutcome::Exhausted) => {
                    bot.send_message(
                        chat,
                        format!("Прогнозы по {} закончились.", category.label()),
                    )
                    .await?;
                }
                Err(DeliveryError::Send(err)) => {
                    warn!(user_id, category = %category, error = %err, "Forecast send failed");
                    bot.send_message(chat, "Ошибка при отправке файла.").await?;
                }
                Err(err) => return Err(err).context("delivery failed"),
            }
            send_categories(&bot, &ctx, chat, user_id).await?;
        }
        CallbackAction::ShowText(key) => {
            let Some(category) = ctx.categories.get(&key) else { return Ok(()) };
            let text = match ctx.db.text(category).await? {
                Some(body) => format!("📝 {}\n\n{}", category.label(), body),
                None => format!("Текстового прогноза по {} пока нет.", category.label()),
            };
            bot.send_message(chat, text).await?;
        }
        CallbackAction::Unknown => debug!(user_id, data, "Unknown callback"),
        admin => {
            if !ctx.config.is_admin(user_id) {
                warn!(user_id, ?admin, "Admin action denied");
                return Ok(());
            }
            handle_admin_action(&bot, &ctx, &dialogue, chat, admin).await?;
        }
    }
    Ok(())
}

async fn handle_admin_action(
    bot: &Bot,
    ctx: &AppContext,
    dialogue: &AdminDialogue,
    chat: ChatId,
    action: CallbackAction,
) -> HandlerResult {
    match action {
        CallbackAction::AdminUpload => {
            dialogue.update(AdminState::AwaitingPayload).await?;
            bot.send_message(chat, "Отправь фото или текст прогноза.").await?;
        }
        CallbackAction::AdminText => {
            bot.send_message(chat, "Выбери категорию для текстового прогноза:")
                .reply_markup(admin_categories_keyboard(&ctx.categories, "textcat_", false))
                .await?;
        }
        CallbackAction::AdminView => {
            let stats = ctx.db.stats(&ctx.categories).await?;
            bot.send_message(chat, format_stats(&stats)).await?;
        }
        CallbackAction::AdminClear => {
            bot.send_message(chat, "Какие прогнозы удалить?")
                .reply_markup(admin_categories_keyboard(&ctx.categories, "clear_", true))
                .await?;
        }
        CallbackAction::AdminImport => {
            let root = Path::new(&ctx.config.forecasts_dir);
            let report = import_dir(&ctx.db, root, &ctx.categories).await?;
            bot.send_message(
                chat,
                format!(
                    "Импорт: добавлено {}, уже были {}, отклонено {}.",
                    report.imported, report.duplicates, report.rejected
                ),
            )
            .await?;
        }
        CallbackAction::AdminCancel => {
            dialogue.exit().await?;
            bot.send_message(chat, "Отменено.").await?;
        }
        CallbackAction::UploadTo(key) => {
            let Some(category) = ctx.categories.get(&key) else { return Ok(()) };
            let Some(AdminState::AwaitingCategory { payload }) = dialogue.get().await? else {
                bot.send_message(chat, "Сначала отправь прогноз.").await?;
                return Ok(());
            };
            let id = ctx.db.upload(category, payload).await?;
            dialogue.exit().await?;
            info!(id, category = %category, "Forecast uploaded");
            bot.send_message(chat, format!("Прогноз добавлен в {} (#{}).", category.label(), id))
                .await?;
        }
        CallbackAction::TextFor(key) => {
            let Some(category) = ctx.categories.get(&key) else { return Ok(()) };
            dialogue
                .update(AdminState::AwaitingText { category: category.clone() })
                .await?;
            bot.send_message(
                chat,
                format!(
                    "Отправь текст прогноза по {}. «-» удалит текущий.",
                    category.label()
                ),
            )
            .await?;
        }
        CallbackAction::Clear(key) => {
            let Some(category) = ctx.categories.get(&key) else { return Ok(()) };
            let n = ctx.db.clear_category(category).await?;
            info!(category = %category, deleted = n, "Category cleared");
            bot.send_message(chat, format!("Удалено прогнозов по {}: {}.", category.label(), n))
                .await?;
        }
        CallbackAction::ClearAll => {
            let n = ctx.db.clear_all().await?;
            info!(deleted = n, "All forecasts cleared");
            bot.send_message(chat, format!("Удалено прогнозов: {}.", n)).await?;
        }
        other => debug!(?other, "Not an admin action"),
    }
    Ok(())
}

async fn receive_payload(
    bot: Bot,
    msg: Message,
    ctx: SharedContext,
    dialogue: AdminDialogue,
) -> HandlerResult {
    if !sender_id(&msg).is_some_and(|id| ctx.config.is_admin(id)) {
        return Ok(());
    }

    let payload = if let Some(photos) = msg.photo() {
        // Берём самый крупный вариант фото
        let Some(best) = photos
            .iter()
            .max_by_key(|p: &&PhotoSize| p.width as i64 * p.height as i64)
        else {
            return Ok(());
        };
        Payload::Photo {
            file_id: best.file.id.0.clone(),
            caption: msg.caption().map(str::to_string),
        }
    } else if let Some(text) = msg.text() {
        Payload::Text {
            body: text.to_string(),
        }
    } else {
        bot.send_message(msg.chat.id, "Нужно фото или текст.").await?;
        return Ok(());
    };

    dialogue
        .update(AdminState::AwaitingCategory { payload })
        .await?;
    bot.send_message(msg.chat.id, "Выбери категорию:")
        .reply_markup(admin_categories_keyboard(&ctx.categories, "upcat_", false))
        .await?;
    Ok(())
}

async fn receive_text(
    bot: Bot,
    msg: Message,
    ctx: SharedContext,
    dialogue: AdminDialogue,
    category: Category,
) -> HandlerResult {
    if !sender_id(&msg).is_some_and(|id| ctx.config.is_admin(id)) {
        return Ok(());
    }
    let Some(text) = msg.text().map(str::trim) else {
        bot.send_message(msg.chat.id, "Нужен текст.").await?;
        return Ok(());
    };

    let reply = if text == "-" {
        ctx.db.clear_text(&category).await?;
        format!("Текстовый прогноз по {} удалён.", category.label())
    } else {
        ctx.db.set_text(&category, text).await?;
        format!("Текстовый прогноз по {} сохранён.", category.label())
    };
    dialogue.exit().await?;
    info!(category = %category, "Category text updated");
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn format_stats(stats: &Stats) -> String {
    let mut out = String::from("📊 Прогнозы:\n");
    for (category, n) in &stats.items_per_category {
        out.push_str(&format!("{}: {}\n", category.label(), n));
    }
    out.push_str(&format!(
        "\nПользователей: {}\nВыдано прогнозов: {}",
        stats.users, stats.deliveries
    ));
    out
}
