use std::time::Duration;

use aws_sdk_ecs::types::{Deployment, Service};
use chrono::{DateTime, Utc};
use console::style;
use skiff_core::app::Application;
use skiff_core::tasks;

use crate::output;

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(app_name: &str, watch: bool) -> anyhow::Result<()> {
    let app = Application::connect(app_name).await?;
    if watch {
        watch_until_stable(&app).await
    } else {
        output::progress("fetching deployments");
        for line in render_services(&app).await?.0 {
            println!("{line}");
        }
        Ok(())
    }
}

/// Redraw the deployment listing until every service is down to a single
/// (stable) deployment.
async fn watch_until_stable(app: &Application) -> anyhow::Result<()> {
    let term = console::Term::stdout();
    let mut height = 0usize;
    loop {
        let (lines, ready) = render_services(app).await?;
        if height > 0 {
            term.clear_last_lines(height)?;
        }
        for line in &lines {
            println!("{line}");
        }
        if ready {
            break;
        }
        height = lines.len();
        tokio::time::sleep(REFRESH_INTERVAL).await;
    }
    output::success("ready");
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

async fn render_services(app: &Application) -> anyhow::Result<(Vec<String>, bool)> {
    let ecs = app.ecs();
    let services = app.services().await?;
    let mut lines = Vec::new();
    let mut ready = true;
    for service in &services {
        lines.extend(service_lines(&ecs, service).await?);
        if service.deployments().len() != 1 {
            ready = false;
        }
    }
    Ok((lines, ready))
}

async fn service_lines(
    ecs: &aws_sdk_ecs::Client,
    service: &Service,
) -> anyhow::Result<Vec<String>> {
    let mut lines = vec![format!(
        "{} {}",
        style("===").dim(),
        style(service.service_name().unwrap_or_default()).green()
    )];
    for deployment in service.deployments() {
        lines.push(deployment_line(ecs, deployment).await?);
    }
    lines.push(String::new());
    Ok(lines)
}

async fn deployment_line(
    ecs: &aws_sdk_ecs::Client,
    deployment: &Deployment,
) -> anyhow::Result<String> {
    let id = match deployment.task_definition() {
        Some(arn) => tasks::deployment_id(ecs, arn).await?,
        None => "unknown".to_string(),
    };
    let status = deployment.status().unwrap_or_default().to_lowercase();
    let status = match deployment.status() {
        Some("PRIMARY") => style(status).green(),
        Some("ACTIVE") => style(status).yellow(),
        _ => style(status),
    };
    let mut line = format!(
        "{id}: {status} tasks:{running}",
        running = deployment.running_count()
    );
    if deployment.running_count() != deployment.desired_count() {
        line.push_str(&format!(
            " {}",
            style(format!(
                "desired:{} pending:{}",
                deployment.desired_count(),
                deployment.pending_count()
            ))
            .yellow()
        ));
    }
    if let Some(created) = deployment.created_at().and_then(to_chrono) {
        line.push_str(&format!(" {}", output::time_ago(created)));
    }
    Ok(line)
}

fn to_chrono(dt: &aws_sdk_ecs::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}
