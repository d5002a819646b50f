use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

const MAX_KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("category list is empty")]
    Empty,
    #[error("invalid category key {0:?}: expected 1-32 chars of [a-z0-9_-]")]
    InvalidKey(String),
    #[error("duplicate category key {0:?}")]
    Duplicate(String),
}

/// Категория прогнозов, например `football`. Получить можно только из
/// [`CategorySet`] или из строк БД, записанных через него.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category(String);

impl Category {
    pub(crate) fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    /// Ключ с заглавной первой буквой, как на кнопках.
    pub fn label(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Настроенные категории в порядке показа.
#[derive(Debug, Clone)]
pub struct CategorySet {
    items: Vec<Category>,
}

impl CategorySet {
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Result<Self, CategoryError> {
        if keys.is_empty() {
            return Err(CategoryError::Empty);
        }
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(keys.len());
        for raw in keys {
            let key = raw.as_ref().trim();
            if !is_valid_key(key) {
                return Err(CategoryError::InvalidKey(key.to_string()));
            }
            if !seen.insert(key.to_string()) {
                return Err(CategoryError::Duplicate(key.to_string()));
            }
            items.push(Category(key.to_string()));
        }
        Ok(Self { items })
    }

    pub fn get(&self, key: &str) -> Option<&Category> {
        self.items.iter().find(|c| c.0 == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Category] {
        &self.items
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else { return false };
    key.len() <= MAX_KEY_LEN
        && (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
