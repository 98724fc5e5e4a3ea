//! Thin passthrough to the configuration CRUD endpoints. No client-side
//! validation: the service owns the rules and its error bodies are surfaced
//! verbatim.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{encode_segment, HttpTransport};
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfigCreate {
    pub name: String,
    pub crypto_symbols: Vec<String>,
    pub initial_capital: f64,
    #[serde(default = "default_check_interval")]
    pub check_interval: u32,
    #[serde(default = "default_true")]
    pub use_ai_signals: bool,
    pub agent_models: Vec<String>,
    #[serde(default = "default_risk")]
    pub risk_per_trade: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
}

fn default_check_interval() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_risk() -> f64 {
    0.02
}

fn default_max_positions() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub id: String,
    #[serde(flatten)]
    pub spec: TradingConfigCreate,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub active_instances: Vec<String>,
}

/// Partial update; absent fields are left unchanged by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_symbols: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_capital: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ai_signals: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_trade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_positions: Option<u32>,
}

pub struct ConfigClient {
    http: HttpTransport,
}

impl ConfigClient {
    pub fn new(base: &str) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(base)?,
        })
    }

    pub async fn list(&self) -> Result<Vec<TradingConfig>> {
        self.send(reqwest::Method::GET, "/config/list", None).await
    }

    pub async fn get(&self, id: &str) -> Result<TradingConfig> {
        self.send(reqwest::Method::GET, &config_path(id, ""), None)
            .await
    }

    pub async fn create(&self, spec: &TradingConfigCreate) -> Result<TradingConfig> {
        self.send(reqwest::Method::POST, "/config/create", Some(json!(spec))).await
    }

    pub async fn update(&self, id: &str, update: &TradingConfigUpdate) -> Result<TradingConfig> {
        self.send(reqwest::Method::PUT, &config_path(id, ""), Some(json!(update)))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<Value> {
        self.send(reqwest::Method::DELETE, &config_path(id, ""), None)
            .await
    }

    pub async fn start(&self, id: &str) -> Result<Value> {
        self.send(reqwest::Method::POST, &config_path(id, "/start"), None)
            .await
    }

    pub async fn available_models(&self) -> Result<Value> {
        self.send(reqwest::Method::GET, "/config/models/available", None)
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = self.http.url_for(path)?;
        log(
            Level::Info,
            Domain::Config,
            "config_request",
            obj(&[("method", v_str(method.as_str())), ("path", v_str(path))]),
        );
        let mut req = self.http.client().request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("{} {}: {}", status.as_u16(), path, text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// `/config/<id><suffix>` with the id escaped as one segment.
fn config_path(id: &str, suffix: &str) -> String {
    format!("/config/{}{}", encode_segment(id), suffix)
}
