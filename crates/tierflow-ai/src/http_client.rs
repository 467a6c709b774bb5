use std::time::Duration;

use reqwest::Client;

use crate::error::{AiError, Result};

const DISABLE_SYSTEM_PROXY_ENV: &str = "TIERFLOW_DISABLE_SYSTEM_PROXY";

/// Client whose every request is bounded by `timeout`, body streaming included.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if should_disable_system_proxy() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|e| AiError::Config(format!("Failed to build HTTP client: {e}")))
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}
