use anyhow::anyhow;
use clap::Subcommand;
use skiff_core::stacks::{
    self, ACCOUNT_TEMPLATE_URL, APP_TEMPLATE_URL, CLUSTER_TEMPLATE_URL,
};
use skiff_core::{aws, SkiffError};

use crate::output;

#[derive(Subcommand)]
pub enum UpgradeSubcommand {
    /// Upgrade the account stack to the latest template
    Account,
    /// Upgrade a cluster stack to the latest template
    Cluster {
        #[arg(default_value = "skiff")]
        name: String,
    },
    /// Upgrade an app stack to the latest template
    App { name: String },
}

pub async fn run(subcommand: UpgradeSubcommand) -> anyhow::Result<()> {
    let (stack_name, template) = match subcommand {
        UpgradeSubcommand::Account => ("skiff-account".to_string(), ACCOUNT_TEMPLATE_URL),
        UpgradeSubcommand::Cluster { name } => {
            (format!("skiff-cluster-{name}"), CLUSTER_TEMPLATE_URL)
        }
        UpgradeSubcommand::App { name } => (format!("skiff-app-{name}"), APP_TEMPLATE_URL),
    };
    upgrade_stack(&stack_name, template).await
}

/// Re-apply the template while keeping the stack's current parameters, then
/// wait for the update to settle.
async fn upgrade_stack(stack_name: &str, template: &str) -> anyhow::Result<()> {
    let config = aws::ambient_config().await;
    let cfn = aws_sdk_cloudformation::Client::new(&config);

    output::progress(&format!("upgrading {stack_name}..."));
    let stack_id = stacks::update_stack(&cfn, stack_name, template).await?;
    match stacks::wait_for_stack(&cfn, stack_name).await {
        Ok(_) => {
            output::success("complete");
            Ok(())
        }
        Err(SkiffError::StackFailed { name, status }) => Err(anyhow!(
            "update of {name} failed ({status}); see {} for details",
            stacks::console_events_url(&stack_id)
        )),
        Err(e) => Err(e.into()),
    }
}
