use clap::Args;

use ferry_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.ferry_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                match state.load_policy() {
                    Ok(policy) => lines.push(format!(
                        "  auth:         OK ({} ranges, token {})",
                        policy.rules().len(),
                        if policy.has_secret() { "enabled" } else { "disabled" }
                    )),
                    Err(e) => lines.push(format!("  auth:         ERROR ({})", e)),
                }
                let serving = if state.work_path.is_dir() { "OK" } else { "MISSING" };
                lines.push(format!(
                    "  work_path:    {} ({})",
                    state.work_path.display(),
                    serving
                ));
                lines.push(format!("  listen_addr:  {}", state.config.listen_addr));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check daemon liveness and readiness
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", base));

        for check in ["livez", "readyz"] {
            let url = format!("{}/_status/{}", base.as_str().trim_end_matches('/'), check);
            let status = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => "OK".to_string(),
                Ok(resp) if resp.status() == reqwest::StatusCode::FORBIDDEN => {
                    "UNAUTHORIZED (check --token)".to_string()
                }
                Ok(resp) => format!("UNHEALTHY ({})", resp.status()),
                Err(_) => "NOT REACHABLE".to_string(),
            };
            lines.push(format!("  {:<7} {}", format!("{}:", check), status));
        }

        Ok(lines.join("\n"))
    }
}
