use std::sync::Arc;

use common::prelude::{AccessPolicy, Authorize, PathError, PathResolver, PolicyError, TransferService};

use super::service_config::Config;
use crate::http_server::ClientIpResolver;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct State {
    policy: Arc<dyn Authorize>,
    transfers: Arc<TransferService>,
    client_ip: Arc<ClientIpResolver>,
}

impl State {
    pub fn new(
        policy: Arc<dyn Authorize>,
        transfers: TransferService,
        client_ip: ClientIpResolver,
    ) -> Self {
        Self {
            policy,
            transfers: Arc::new(transfers),
            client_ip: Arc::new(client_ip),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Make sure the served directory exists and pin it to an absolute path
        tokio::fs::create_dir_all(&config.work_path).await?;
        let root = tokio::fs::canonicalize(&config.work_path).await?;
        tracing::info!("Serving files from {}", root.display());

        // 2. Transfer service rooted there
        let transfers = TransferService::new(PathResolver::new(&root)?);

        // 3. Forwarding headers are only believed from these peers
        let client_ip = ClientIpResolver::new(&config.trusted_proxies)?;

        log_policy(&config.policy);

        Ok(Self::new(
            Arc::new(config.policy.clone()),
            transfers,
            client_ip,
        ))
    }

    pub fn policy(&self) -> &dyn Authorize {
        self.policy.as_ref()
    }

    pub fn transfers(&self) -> &TransferService {
        &self.transfers
    }

    pub fn client_ip(&self) -> &ClientIpResolver {
        &self.client_ip
    }
}

fn log_policy(policy: &AccessPolicy) {
    let rules = policy
        .rules()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    tracing::info!(
        authorized_ips = ?rules,
        token_auth = policy.has_secret(),
        "access policy loaded"
    );
    if rules.is_empty() && !policy.has_secret() {
        tracing::warn!("access policy admits nobody; every request will be rejected");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to prepare the served directory: {0}")]
    WorkPath(#[from] std::io::Error),
    #[error("invalid served directory: {0}")]
    Root(#[from] PathError),
    #[error("invalid trusted proxy: {0}")]
    TrustedProxies(#[from] PolicyError),
}
