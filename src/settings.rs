use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::models::{UserSettings, default_currency};
use crate::rounding::RoundingOption;
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct SettingsChange {
    pub rounding: Option<RoundingOption>,
    pub currency: Option<String>,
    pub business_name: Option<String>,
}

/// Returns the account's settings row, creating it with defaults on first use.
pub fn load_settings<S: Store>(store: &mut S) -> Result<UserSettings> {
    if let Some(settings) = store.list::<UserSettings>()?.into_iter().next() {
        return Ok(settings);
    }
    let settings = UserSettings {
        id: Uuid::new_v4(),
        user_id: store.user_id(),
        rounding: RoundingOption::default(),
        currency: default_currency(),
        business_name: None,
        updated_at: Utc::now(),
    };
    store.insert(&settings)?;
    info!("created default settings");
    Ok(settings)
}

pub fn update_settings<S: Store>(store: &mut S, change: SettingsChange) -> Result<UserSettings> {
    let mut settings = load_settings(store)?;
    if let Some(rounding) = change.rounding {
        settings.rounding = rounding;
    }
    if let Some(currency) = change.currency {
        settings.currency = validate_currency(&currency)?;
    }
    if let Some(name) = change.business_name {
        let name = name.trim();
        settings.business_name = (!name.is_empty()).then(|| name.to_string());
    }
    settings.updated_at = Utc::now();
    store.update(&settings)?;
    info!(rounding = %settings.rounding, currency = %settings.currency, "updated settings");
    Ok(settings)
}

pub fn validate_currency(value: &str) -> std::result::Result<String, ValidationError> {
    let code = value.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(ValidationError::Rejected(format!(
            "Currency must be a three-letter ISO code, got '{value}'."
        )))
    }
}
