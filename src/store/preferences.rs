//! Language preference persistence.

use std::sync::Arc;

use super::secure::{SecureStorage, StoreError};

pub const LANGUAGE_KEY: &str = "language";

/// Language used when none has been chosen.
pub const DEFAULT_LANGUAGE: &str = "en";

pub struct Preferences {
    storage: Arc<dyn SecureStorage>,
}

impl Preferences {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// The stored language code, if the user picked one.
    pub fn stored_language(&self) -> Option<String> {
        match self.storage.get(LANGUAGE_KEY) {
            Ok(code) => code,
            Err(e) => {
                log::warn!("Failed to read language preference: {}", e);
                None
            }
        }
    }

    /// The stored language code or [`DEFAULT_LANGUAGE`].
    pub fn language(&self) -> String {
        self.stored_language()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }

    /// Validate, normalise and persist a language code such as `es` or `pt-br`.
    ///
    /// Returns the normalised code (`pt-BR`), or `None` if the code is invalid.
    pub fn set_language(&self, code: &str) -> Result<Option<String>, StoreError> {
        let Some(normalised) = normalise_language(code) else {
            return Ok(None);
        };
        self.storage.set(LANGUAGE_KEY, &normalised)?;
        log::info!("Language preference set to {}", normalised);
        Ok(Some(normalised))
    }
}

/// `ll` or `lll`, optionally followed by `-` and a 2-4 character region.
fn normalise_language(code: &str) -> Option<String> {
    let code = code.trim();
    let (lang, region) = match code.split_once(['-', '_']) {
        Some((lang, region)) => (lang, Some(region)),
        None => (code, None),
    };

    if !(2..=3).contains(&lang.len()) || !lang.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let lang = lang.to_ascii_lowercase();

    match region {
        None => Some(lang),
        Some(region)
            if (2..=4).contains(&region.len())
                && region.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Some(format!("{}-{}", lang, region.to_ascii_uppercase()))
        }
        Some(_) => None,
    }
}
