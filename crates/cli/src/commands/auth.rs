//! Session and portal mode commands.
//!
//! # Usage
//!
//! ```bash
//! stx login -u alice          # prompts for the password
//! STAXTRADE_PASSWORD=... stx login -u alice
//! stx register -u bob
//! stx status
//! stx mode customer
//! ```

use std::io::{BufRead, Write};

use secrecy::SecretString;
use staxtrade_client::StaxTradeClient;
use staxtrade_core::PortalMode;
use tracing::info;

use super::{CommandError, money};

/// Read the password from `STAXTRADE_PASSWORD` or a stdin prompt.
#[allow(clippy::print_stderr)]
fn read_password() -> Result<SecretString, CommandError> {
    if let Ok(password) = std::env::var("STAXTRADE_PASSWORD") {
        return Ok(SecretString::from(password));
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(
        line.trim_end_matches(['\r', '\n']).to_string(),
    ))
}

/// Sign in and store the token pair.
///
/// # Errors
///
/// Returns `CommandError::Api` with `Unauthorized` for bad credentials.
pub async fn login(client: &StaxTradeClient, username: &str) -> Result<(), CommandError> {
    let password = read_password()?;
    client.login(username, &password).await?;
    info!("Signed in as {username}");
    Ok(())
}

/// Create an account.
///
/// # Errors
///
/// Returns `CommandError::Api` with `Validation` if the username is taken.
pub async fn register(client: &StaxTradeClient, username: &str) -> Result<(), CommandError> {
    let password = read_password()?;
    client.register(username, &password).await?;
    info!("Account created for {username}; run `stx login -u {username}` to sign in");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError::Api` if the session could not be cleared.
pub async fn logout(client: &StaxTradeClient) -> Result<(), CommandError> {
    client.logout().await?;
    info!("Signed out");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn status(client: &StaxTradeClient) {
    let session = client.session().get();
    println!("API:       {}", client.config().api_url);
    println!(
        "Session:   {}",
        if session.is_authenticated() {
            "signed in"
        } else {
            "signed out"
        }
    );
    println!("Mode:      {}", client.portal_mode().get());
    println!(
        "Cart:      {} lines, {} items, {}",
        client.cart().line_count(),
        client.cart().item_count(),
        money(client.cart().total())
    );
}

/// Set the portal mode, or toggle it when none is given.
///
/// # Errors
///
/// Returns `CommandError::Storage` if the mode could not be persisted.
#[allow(clippy::print_stdout)]
pub fn mode(client: &StaxTradeClient, mode: Option<PortalMode>) -> Result<(), CommandError> {
    let store = client.portal_mode();
    let current = match mode {
        Some(mode) => {
            store.set(mode)?;
            mode
        }
        None => store.toggle()?,
    };
    println!("Portal mode: {current}");
    Ok(())
}
