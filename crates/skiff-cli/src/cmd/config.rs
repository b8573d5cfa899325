use anyhow::bail;
use clap::Subcommand;
use skiff_core::app::Application;
use skiff_core::parameters;

use crate::output;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// List the app's config vars
    List,
    /// Print the value of one variable
    Get { key: String },
    /// Set a variable using KEY=value format
    Set {
        #[arg(value_parser = parse_kv)]
        pair: (String, String),
    },
    /// Unset (delete) a variable
    Unset { key: String },
}

pub async fn run(app_name: &str, subcommand: ConfigSubcommand) -> anyhow::Result<()> {
    let app = Application::connect(app_name).await?;
    match subcommand {
        ConfigSubcommand::List => list(&app).await,
        ConfigSubcommand::Get { key } => get(&app, &key).await,
        ConfigSubcommand::Set { pair } => set(&app, &pair.0, &pair.1).await,
        ConfigSubcommand::Unset { key } => unset(&app, &key).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn list(app: &Application) -> anyhow::Result<()> {
    output::print_header(&format!("{} config vars", app.name));
    let mut vars = parameters::load_parameters(&app.ssm(), &app.settings.parameter_store.prefix)
        .await?
        .into_iter()
        .collect::<Vec<_>>();
    if app.settings.parameter_store.chamber_compatible {
        for (key, _) in vars.iter_mut() {
            *key = key.to_uppercase();
        }
        vars.sort();
    }
    output::print_aligned(&vars);
    Ok(())
}

async fn get(app: &Application, key: &str) -> anyhow::Result<()> {
    let (name, _) = parameter_name(app, key);
    match parameters::get_parameter(&app.ssm(), &name).await? {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => bail!("{key} is not set"),
    }
}

async fn set(app: &Application, key: &str, value: &str) -> anyhow::Result<()> {
    let (name, display) = parameter_name(app, key);
    parameters::put_secure_parameter(&app.ssm(), &name, value).await?;
    output::success(&format!("set {display}"));
    Ok(())
}

async fn unset(app: &Application, key: &str) -> anyhow::Result<()> {
    let (name, display) = parameter_name(app, key);
    parameters::delete_parameter(&app.ssm(), &name).await?;
    output::success(&format!("deleted {display}"));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Full parameter name plus the display form of the key. Chamber-compatible
/// apps store keys lowercase and show them uppercase.
fn parameter_name(app: &Application, key: &str) -> (String, String) {
    let (store, display) = if app.settings.parameter_store.chamber_compatible {
        (key.to_lowercase(), key.to_uppercase())
    } else {
        (key.to_string(), key.to_string())
    };
    (
        format!("{}/{}", app.settings.parameter_store.prefix, store),
        display,
    )
}

fn parse_kv(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, _)) if k.trim().is_empty() => Err(format!("key cannot be empty in: {s}")),
        Some((k, v)) => Ok((k.trim().to_string(), v.to_string())),
        None => Err(format!("expected KEY=value, got: {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kv_splits_on_first_equals() {
        assert_eq!(
            parse_kv("DATABASE_URL=postgres://u:p@h/db").unwrap(),
            ("DATABASE_URL".into(), "postgres://u:p@h/db".into())
        );
        assert!(parse_kv("NOVALUE").is_err());
        assert!(parse_kv("=value").is_err());
    }
}
