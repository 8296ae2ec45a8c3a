use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{AppError, ValidationError},
    identity::IdentityProvider,
    models::{Role, UserRecord, USERS},
    store::{encode, DocumentStore},
};

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
}

impl RegistrationForm {
    /// Email shape, then password length, then confirmation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

/// Creates the identity, then its profile keyed by the identity's uid.
///
/// If the profile write fails the identity is deleted again so no account is
/// left without a profile. The password only goes to the identity provider.
pub async fn register(
    store: &dyn DocumentStore,
    identities: &dyn IdentityProvider,
    form: &RegistrationForm,
) -> Result<UserRecord, AppError> {
    form.validate()?;

    let identity = identities
        .create_identity(&form.email, &form.password)
        .await?;

    let mut user = UserRecord {
        id: String::new(),
        email: identity.email.clone(),
        name: form.name.trim().to_string(),
        role: Role::User,
    };

    let written = match encode(&user) {
        Ok(data) => store.set(USERS, &identity.uid, data).await,
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        log::error!("Profile write failed for {}: {err}", identity.email);
        if let Err(undo) = identities.delete_identity(&identity.uid).await {
            log::warn!(
                "Could not remove orphaned identity {} after failed registration: {undo}",
                identity.uid
            );
        }
        return Err(err.into());
    }

    user.id = identity.uid;
    log::info!("Registered {}", user.email);
    Ok(user)
}
