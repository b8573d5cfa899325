use clap::Subcommand;
use console::style;
use skiff_core::stacks::{self, StackRef};
use skiff_core::{aws, parameters, SkiffError, PARAMETER_ROOT};

use crate::output;

#[derive(Subcommand)]
pub enum DestroySubcommand {
    /// Destroy the account-level resources
    Account,
    /// Destroy a cluster
    Cluster { name: String },
    /// Destroy an app
    App { name: String },
}

pub async fn run(subcommand: DestroySubcommand) -> anyhow::Result<()> {
    let config = aws::ambient_config().await;
    let ssm = aws_sdk_ssm::Client::new(&config);
    let cfn = aws_sdk_cloudformation::Client::new(&config);

    let (what, stack_id) = match &subcommand {
        DestroySubcommand::Account => {
            let account: StackRef =
                parameters::get_json_parameter(&ssm, &format!("{PARAMETER_ROOT}/account"))
                    .await?
                    .ok_or(SkiffError::AccountNotFound)?;
            ("the skiff account resources".to_string(), account.stack_id)
        }
        DestroySubcommand::Cluster { name } => {
            let cluster: StackRef =
                parameters::get_json_parameter(&ssm, &format!("{PARAMETER_ROOT}/cluster/{name}"))
                    .await?
                    .ok_or_else(|| SkiffError::ClusterNotFound(name.clone()))?;
            (format!("cluster \"{name}\""), cluster.stack_id)
        }
        DestroySubcommand::App { name } => {
            let stack = stacks::describe_stack(&cfn, &format!("skiff-app-{name}"))
                .await?
                .ok_or_else(|| SkiffError::AppNotFound(name.clone()))?;
            let stack_id = stack
                .stack_id()
                .ok_or_else(|| SkiffError::AppNotFound(name.clone()))?
                .to_string();
            (format!("app \"{name}\""), stack_id)
        }
    };

    println!(
        "{}",
        style(format!(
            "This will destroy {what}. Are you sure you want to continue?"
        ))
        .red()
    );
    let confirmation: String = dialoguer::Input::new()
        .with_prompt("type \"destroy\" to continue")
        .allow_empty(true)
        .interact_text()?;
    if confirmation != "destroy" {
        output::progress("aborted");
        return Ok(());
    }

    output::progress(&format!("destroying {what}..."));
    stacks::delete_stack(&cfn, &stack_id).await?;
    stacks::wait_for_delete(&cfn, &stack_id).await?;
    output::success("destroyed");
    Ok(())
}
