mod category;
mod config;
mod content;
mod db;
mod delivery;
mod forecast;
mod handlers;
mod import;
mod keyboards;
mod tracker;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::config::{config_json_arg, Config};
use crate::db::Db;
use crate::delivery::TelegramNotifier;
use crate::handlers::{AdminState, AppContext};
use crate::import::import_dir;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = if let Some(json) = config_json_arg(std::env::args().skip(1)) {
        Config::from_json_str(&json).context("failed to parse --config-json")?
    } else {
        Config::load().context("failed to load config")?
    };

    // RUST_LOG важнее уровня из конфига, например RUST_LOG=info,teloxide=warn
    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "info,teloxide=info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).compact().init();

    let categories = config.category_set()?;
    info!(
        categories = ?categories.iter().map(|c| c.key()).collect::<Vec<_>>(),
        admins = config.admin_ids.len(),
        "Config loaded"
    );
    if config.admin_ids.is_empty() {
        warn!("No admin ids configured, admin panel is unreachable");
    }

    let db = Db::open(&config.db_path)
        .await
        .context("failed to open sqlite db")?;

    if config.import_on_start {
        import_dir(&db, Path::new(&config.forecasts_dir), &categories)
            .await
            .context("failed to import forecasts directory")?;
    }

    // без токена в конфиге teloxide читает TELOXIDE_TOKEN из окружения
    let bot = match config.teloxide_token.as_deref() {
        Some(token) => Bot::new(token),
        None => Bot::from_env(),
    };

    match bot.get_me().await {
        Ok(me) => {
            info!(
                id = me.id.0,
                username = me.user.username.as_deref().unwrap_or(""),
                "Bot started"
            );
        }
        Err(err) => warn!(error = %err, "Failed to fetch bot info"),
    }

    let ctx = Arc::new(AppContext {
        notifier: TelegramNotifier::new(bot.clone()),
        config,
        categories,
        db,
    });

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![ctx, InMemStorage::<AdminState>::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
