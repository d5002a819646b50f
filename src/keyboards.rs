use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::category::{Category, CategorySet};

pub const START_TEXT: &str = "Добро пожаловать! Нажмите кнопку ниже для прогноза:";
pub const CATEGORIES_TEXT: &str = "Выбери категорию спорта для получения прогноза:";
pub const ADMIN_TEXT: &str = "🔧 Админ-панель";

/// Действие inline-кнопки. Ключ категории остаётся строкой до проверки по набору.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    ShowStart,
    ShowCategories,
    Noop,
    Deliver(String),
    ShowText(String),
    AdminUpload,
    AdminText,
    AdminView,
    AdminClear,
    AdminImport,
    AdminCancel,
    UploadTo(String),
    TextFor(String),
    Clear(String),
    ClearAll,
    Unknown,
}

pub fn parse_callback(data: &str) -> CallbackAction {
    match data {
        "back_to_start" => return CallbackAction::ShowStart,
        "start_predictions" => return CallbackAction::ShowCategories,
        "none" => return CallbackAction::Noop,
        "admin_upload" => return CallbackAction::AdminUpload,
        "admin_text" => return CallbackAction::AdminText,
        "admin_view" => return CallbackAction::AdminView,
        "admin_clear" => return CallbackAction::AdminClear,
        "admin_import" => return CallbackAction::AdminImport,
        "admin_cancel" => return CallbackAction::AdminCancel,
        "admin_clear_all" => return CallbackAction::ClearAll,
        _ => {}
    }
    let prefixed: [(&str, fn(String) -> CallbackAction); 5] = [
        ("sport_", CallbackAction::Deliver),
        ("text_", CallbackAction::ShowText),
        ("upcat_", CallbackAction::UploadTo),
        ("textcat_", CallbackAction::TextFor),
        ("clear_", CallbackAction::Clear),
    ];
    for (prefix, action) in prefixed {
        if let Some(key) = data.strip_prefix(prefix) {
            if !key.is_empty() {
                return action(key.to_string());
            }
        }
    }
    CallbackAction::Unknown
}

pub fn start_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔮 AI прогнозы",
        "start_predictions",
    )]])
}

/// По строке на категорию: `Football — 3`, плюс кнопка 📝, если задан текстовый прогноз.
/// Пустым категориям достаётся неактивный callback `none`.
pub fn categories_keyboard(counts: &[(Category, usize)], with_text: &[Category]) -> InlineKeyboardMarkup {
    let rows = counts
        .iter()
        .map(|(category, count)| {
            let data = if *count > 0 {
                format!("sport_{}", category.key())
            } else {
                "none".to_string()
            };
            let mut row = vec![InlineKeyboardButton::callback(
                format!("{} — {}", category.label(), count),
                data,
            )];
            if with_text.contains(category) {
                row.push(InlineKeyboardButton::callback(
                    "📝",
                    format!("text_{}", category.key()),
                ));
            }
            row
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_panel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("📤 Загрузить прогноз", "admin_upload")],
        vec![InlineKeyboardButton::callback("📝 Текстовый прогноз", "admin_text")],
        vec![InlineKeyboardButton::callback("📊 Просмотр прогнозов", "admin_view")],
        vec![InlineKeyboardButton::callback("📂 Импорт из папки", "admin_import")],
        vec![InlineKeyboardButton::callback("🗑 Очистить прогнозы", "admin_clear")],
        vec![InlineKeyboardButton::callback("🔙 Назад", "back_to_start")],
    ])
}

/// Выбор категории в админке; `prefix` задаёт действие.
pub fn admin_categories_keyboard(
    categories: &CategorySet,
    prefix: &str,
    include_all: bool,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = categories
        .iter()
        .map(|c| {
            vec![InlineKeyboardButton::callback(
                c.label(),
                format!("{}{}", prefix, c.key()),
            )]
        })
        .collect();
    if include_all {
        rows.push(vec![InlineKeyboardButton::callback(
            "Все категории",
            "admin_clear_all",
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback("Отмена", "admin_cancel")]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callbacks(kb: &InlineKeyboardMarkup) -> Vec<Vec<String>> {
        kb.inline_keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|b| match &b.kind {
                        InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn parses_fixed_and_prefixed_callbacks() {
        assert_eq!(parse_callback("none"), CallbackAction::Noop);
        assert_eq!(parse_callback("start_predictions"), CallbackAction::ShowCategories);
        assert_eq!(
            parse_callback("sport_football"),
            CallbackAction::Deliver("football".into())
        );
        assert_eq!(parse_callback("text_cs"), CallbackAction::ShowText("cs".into()));
        assert_eq!(parse_callback("upcat_dota"), CallbackAction::UploadTo("dota".into()));
        assert_eq!(
            parse_callback("textcat_tennis"),
            CallbackAction::TextFor("tennis".into())
        );
        assert_eq!(parse_callback("clear_hockey"), CallbackAction::Clear("hockey".into()));
        assert_eq!(parse_callback("admin_clear_all"), CallbackAction::ClearAll);
        assert_eq!(parse_callback("clear_all"), CallbackAction::Clear("all".into()));
        assert_eq!(parse_callback("sport_"), CallbackAction::Unknown);
        assert_eq!(parse_callback("pay_cs_2"), CallbackAction::Unknown);
    }

    #[test]
    fn empty_categories_are_inert() {
        let set = CategorySet::new(&["football", "hockey"]).unwrap();
        let counts = vec![
            (set.get("football").unwrap().clone(), 2),
            (set.get("hockey").unwrap().clone(), 0),
        ];
        let kb = categories_keyboard(&counts, &[set.get("hockey").unwrap().clone()]);

        assert_eq!(kb.inline_keyboard[0][0].text, "Football — 2");
        assert_eq!(kb.inline_keyboard[1][0].text, "Hockey — 0");
        assert_eq!(
            callbacks(&kb),
            vec![
                vec!["sport_football".to_string()],
                vec!["none".to_string(), "text_hockey".to_string()],
            ]
        );
    }

    #[test]
    fn admin_keyboards_round_trip_through_parser() {
        let set = CategorySet::new(&["cs", "tennis"]).unwrap();
        let kb = admin_categories_keyboard(&set, "clear_", true);
        let actions: Vec<CallbackAction> = callbacks(&kb)
            .into_iter()
            .flatten()
            .map(|d| parse_callback(&d))
            .collect();
        assert_eq!(
            actions,
            vec![
                CallbackAction::Clear("cs".into()),
                CallbackAction::Clear("tennis".into()),
                CallbackAction::ClearAll,
                CallbackAction::AdminCancel,
            ]
        );

        for data in callbacks(&admin_panel_keyboard()).into_iter().flatten() {
            assert_ne!(parse_callback(&data), CallbackAction::Unknown, "{data}");
        }
    }
}
