use std::borrow::Cow;

use rocket::serde::json::Json;
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::models::{IMPORTANCE_LEVELS, SKILL_LEVELS};

/// Unwraps a JSON body after running its `validator` rules.
pub trait ValidatedJson<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> ValidatedJson<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

fn one_of(value: &str, choices: &[&str], code: &'static str) -> Result<(), ValidationError> {
    if choices.contains(&value) {
        Ok(())
    } else {
        let mut err = ValidationError::new(code);
        err.message = Some(Cow::Owned(format!("must be one of {}", choices.join(", "))));
        Err(err)
    }
}

pub fn validate_skill_level(level: &str) -> Result<(), ValidationError> {
    one_of(level, &SKILL_LEVELS, "skill_level")
}

pub fn validate_importance(importance: &str) -> Result<(), ValidationError> {
    one_of(importance, &IMPORTANCE_LEVELS, "importance")
}

/// Accepts a comma or semicolon separated list of email addresses; blank is
/// allowed and means "use the default recipients".
pub fn validate_recipient_list(raw: &str) -> Result<(), ValidationError> {
    let invalid: Vec<String> = crate::models::split_recipients(raw)
        .into_iter()
        .filter(|r| {
            let mut parts = r.splitn(2, '@');
            let local = parts.next().unwrap_or_default();
            let domain = parts.next().unwrap_or_default();
            local.is_empty() || !domain.contains('.') || domain.starts_with('.')
        })
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        let mut err = ValidationError::new("recipients");
        err.message = Some(Cow::Owned(format!(
            "invalid email address: {}",
            invalid.join(", ")
        )));
        Err(err)
    }
}
