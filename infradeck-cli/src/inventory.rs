//! Template inventory backed by Vault (per-cluster API tokens) and the
//! Proxmox cluster resources API.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use infradeck_core::config::LookupConfig;
use infradeck_core::lookup::{InventoryLookup, LookupError, TemplateFilter};

const ROLE_ID_ENV: &str = "TF_VAR_role_id";
const SECRET_ID_ENV: &str = "TF_VAR_secret_id";
const PROXMOX_PORT: u16 = 8006;

/// Connection details stored in Vault for one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxmoxCredentials {
    pub api_url: String,
    pub token_id: String,
    pub token_secret: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    data: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    template: u8,
}

pub struct VaultProxmoxLookup {
    vault_addr: String,
    secret_mount: String,
    filter: TemplateFilter,
    vault: reqwest::Client,
    inventory: reqwest::Client,
}

impl VaultProxmoxLookup {
    pub fn new(config: &LookupConfig, filter: TemplateFilter) -> Result<Self, reqwest::Error> {
        let timeout = config.timeout();
        let vault = reqwest::Client::builder().timeout(timeout).build()?;
        // hypervisors typically serve self-signed certificates
        let inventory = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            vault_addr: config.vault_addr().trim_end_matches('/').to_string(),
            secret_mount: config.secret_mount.trim_matches('/').to_string(),
            filter,
            vault,
            inventory,
        })
    }

    async fn login(&self) -> Result<String, LookupError> {
        let role_id = required_env(ROLE_ID_ENV)?;
        let secret_id = required_env(SECRET_ID_ENV)?;

        let url = format!("{}/v1/auth/approle/login", self.vault_addr);
        let response = self
            .vault
            .post(&url)
            .json(&json!({ "role_id": role_id, "secret_id": secret_id }))
            .send()
            .await
            .map_err(|e| LookupError::Secret(format!("vault login: {}", e)))?;
        if !response.status().is_success() {
            return Err(LookupError::Secret(format!(
                "vault AppRole login failed: HTTP {}",
                response.status()
            )));
        }
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(format!("vault login response: {}", e)))?;
        body.auth
            .map(|a| a.client_token)
            .ok_or_else(|| LookupError::Secret("vault AppRole login returned no token".into()))
    }

    async fn credentials(&self, cluster: &str) -> Result<ProxmoxCredentials, LookupError> {
        let token = self.login().await?;
        let path = secret_path(&self.secret_mount, cluster);
        let url = format!("{}/v1/{}", self.vault_addr, path);

        let response = self
            .vault
            .get(&url)
            .header("X-Vault-Token", token)
            .send()
            .await
            .map_err(|e| LookupError::Secret(format!("vault read {}: {}", path, e)))?;
        if !response.status().is_success() {
            return Err(LookupError::Secret(format!(
                "vault read failed for {}: HTTP {}",
                path,
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(format!("vault secret {}: {}", path, e)))?;
        credentials_from_secret(&body, &path)
    }

    async fn list_templates(&self, creds: &ProxmoxCredentials) -> Result<Vec<String>, LookupError> {
        let url = resources_url(&creds.api_url);
        let response = self
            .inventory
            .get(&url)
            .header(
                "Authorization",
                format!("PVEAPIToken={}={}", creds.token_id, creds.token_secret),
            )
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LookupError::Request(format!("HTTP {}", response.status())));
        }
        let text = response
            .text()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        template_names(&text)
    }
}

#[async_trait]
impl InventoryLookup for VaultProxmoxLookup {
    async fn templates_for(&self, cluster: &str) -> Result<Vec<String>, LookupError> {
        let creds = self.credentials(cluster).await?;
        tracing::debug!(cluster, api = %creds.api_url, "querying inventory");
        let templates = self.list_templates(&creds).await?;
        Ok(self.filter.apply(templates))
    }
}

fn required_env(name: &str) -> Result<String, LookupError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(LookupError::MissingCredentials(name.to_string())),
    }
}

/// kv v2 data path for `cluster` under `mount`
pub fn secret_path(mount: &str, cluster: &str) -> String {
    format!("{}/data/{}", mount, cluster)
}

/// Pull the three Proxmox fields out of a Vault read response. Handles
/// both kv v2 (`data.data`) and kv v1 (`data`) layouts.
pub fn credentials_from_secret(body: &Value, path: &str) -> Result<ProxmoxCredentials, LookupError> {
    let mut data = body
        .get("data")
        .ok_or_else(|| LookupError::Malformed(format!("vault secret {} has no data", path)))?;
    if let Some(inner) = data.get("data").filter(|v| v.is_object()) {
        data = inner;
    }

    let fields: HashMap<&str, &str> = ["proxmox_api_url", "proxmox_api_token_id", "proxmox_api_token_secret"]
        .into_iter()
        .filter_map(|key| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect();

    match (
        fields.get("proxmox_api_url"),
        fields.get("proxmox_api_token_id"),
        fields.get("proxmox_api_token_secret"),
    ) {
        (Some(url), Some(id), Some(secret)) => Ok(ProxmoxCredentials {
            api_url: url.to_string(),
            token_id: id.to_string(),
            token_secret: secret.to_string(),
        }),
        _ => Err(LookupError::Secret(format!("missing fields in Vault secret {}", path))),
    }
}

/// Cluster resources endpoint. A bare host gets the default scheme and
/// port; a full URL is used as given.
pub fn resources_url(api: &str) -> String {
    let base = if api.contains("://") {
        api.trim_end_matches('/').to_string()
    } else {
        format!("https://{}:{}", api, PROXMOX_PORT)
    };
    format!("{}/api2/json/cluster/resources?type=vm", base)
}

/// Names of every VM flagged as a template
pub fn template_names(body: &str) -> Result<Vec<String>, LookupError> {
    let parsed: ResourceList =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
    Ok(parsed
        .data
        .into_iter()
        .filter(|r| r.template == 1)
        .filter_map(|r| r.name)
        .collect())
}
