use clap::Subcommand;
use console::style;
use skiff_core::auth::AuthClient;

use crate::output;

#[derive(Subcommand)]
pub enum AuthSubcommand {
    /// Authorize this CLI via the browser
    Login,
    /// Show the logged-in identity
    Whoami,
    /// Forget cached credentials
    Logout,
}

pub async fn run(subcommand: AuthSubcommand) -> anyhow::Result<()> {
    match subcommand {
        AuthSubcommand::Login => login().await,
        AuthSubcommand::Whoami => whoami().await,
        AuthSubcommand::Logout => logout(),
    }
}

// ---------------------------------------------------------------------------
// login
// ---------------------------------------------------------------------------

async fn login() -> anyhow::Result<()> {
    let auth = AuthClient::new()?;
    let authorization = auth.request_device_authorization().await?;

    println!(
        "Your verification code is {}",
        style(&authorization.user_code).bold()
    );
    if open::that(&authorization.verification_uri_complete).is_err() {
        println!(
            "Open {} in your browser to continue",
            authorization.verification_uri_complete
        );
    }

    output::progress("waiting for verification...");
    let tokens = auth.poll_for_tokens(&authorization).await?;
    let user = auth.fetch_user_info(&tokens.access_token).await?;
    output::success(&format!("logged in as {}", user.email));
    Ok(())
}

// ---------------------------------------------------------------------------
// whoami / logout
// ---------------------------------------------------------------------------

async fn whoami() -> anyhow::Result<()> {
    let auth = AuthClient::new()?;
    let (_, user) = auth.verify().await?;
    println!("{}", user.email);
    Ok(())
}

fn logout() -> anyhow::Result<()> {
    let auth = AuthClient::new()?;
    auth.logout()?;
    output::success("logged out");
    Ok(())
}
