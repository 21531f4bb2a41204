//! Back-office account creation.
//!
//! Admin and staff accounts cannot be created through the public API; this is
//! the only way in.
//!
//! # Usage
//!
//! ```bash
//! vgk-cli admin create -e admin@videgrenierkamer.cm -p 677123456 \
//!     --first-name Aline --last-name Mbarga --city Yaounde
//! vgk-cli staff create -e relais.akwa@videgrenierkamer.cm -p 699000111 \
//!     --first-name Paul --last-name Etoa --city Douala
//! ```
//!
//! The password comes from `--password` or `VGK_ACCOUNT_PASSWORD`.

use vide_grenier_core::{City, UserType};
use vide_grenier_marketplace::services::AuthService;
use vide_grenier_marketplace::services::auth::Registration;

use super::{CommandError, connect};

/// Fields for a new back-office account.
pub struct AccountForm<'a> {
    pub email: &'a str,
    pub phone: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub city: &'a str,
}

/// Create an admin or staff account. Returns the new account's ID.
///
/// # Errors
///
/// Returns an error for an unknown city, a validation failure, a taken
/// email or phone, or a database failure.
pub async fn create(form: &AccountForm<'_>, user_type: UserType) -> Result<String, CommandError> {
    let city: City = form
        .city
        .parse()
        .map_err(|_| CommandError::Failed(format!("Unknown city: {}", form.city)))?;

    let state = connect().await?;

    tracing::info!("Creating {} account: {}", user_type, form.email);

    let user = AuthService::new(state.pool())
        .create_account(
            &Registration {
                email: form.email,
                phone: form.phone,
                password: form.password,
                first_name: form.first_name,
                last_name: form.last_name,
                city,
            },
            user_type,
        )
        .await
        .map_err(CommandError::failed)?;

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Type: {}",
        user.id,
        user.email,
        user.user_type
    );

    Ok(user.id.to_string())
}
