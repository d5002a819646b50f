use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::category::CategorySet;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(alias = "TELOXIDE_TOKEN")]
    pub teloxide_token: Option<String>,
    #[serde(alias = "ADMIN_IDS", default)]
    pub admin_ids: Vec<i64>,
    #[serde(alias = "CATEGORIES", default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(alias = "DB_PATH", default = "default_db_path")]
    pub db_path: String,
    #[serde(alias = "FORECASTS_DIR", default = "default_forecasts_dir")]
    pub forecasts_dir: String,
    #[serde(
        alias = "IMPORT_ON_START",
        default = "default_import_on_start"
    )]
    pub import_on_start: bool,
    #[serde(alias = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

fn default_categories() -> Vec<String> {
    ["football", "hockey", "dota", "cs", "tennis"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_db_path() -> String {
    "forecasts.db".to_string()
}

fn default_forecasts_dir() -> String {
    "forecasts".to_string()
}

fn default_import_on_start() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            teloxide_token: None,
            admin_ids: Vec::new(),
            categories: default_categories(),
            db_path: default_db_path(),
            forecasts_dir: default_forecasts_dir(),
            import_on_start: default_import_on_start(),
            log_level: None,
        }
    }
}

impl Config {
    /// Читает файл из `CONFIG_PATH`, иначе `config.json`.
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var("CONFIG_PATH").ok().as_deref())
    }

    /// Явно заданный путь обязан существовать. Без него отсутствие
    /// `config.json` даёт настройки по умолчанию.
    pub fn load_from(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => load_config(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(raw).context("некорректный JSON конфигурации")?;
        Ok(cfg)
    }

    /// Проверенный набор категорий; с плохим списком бот не стартует.
    pub fn category_set(&self) -> Result<CategorySet> {
        CategorySet::new(&self.categories).context("invalid categories in config")
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("не удалось прочитать config: {}", path))?;
    let cfg: Config =
        serde_json::from_str(&raw).with_context(|| format!("некорректный JSON: {}", path))?;
    Ok(cfg)
}

/// Ищет `--config-json <json>` или `--config-json=<json>` среди аргументов.
pub fn config_json_arg<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if let Some(rest) = arg.strip_prefix("--config-json=") {
            return Some(rest.to_string());
        }
        if arg == "--config-json" {
            return args.next();
        }
    }
    None
}
