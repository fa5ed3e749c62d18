use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub mqtt: Option<MqttConf>,
    pub store: StoreConf,
    pub notifier: Option<NotifierConf>,
    /// Administrative recipient for OTP deliveries; also the identity
    /// that gets the privileged flag on login.
    pub admin_email: String,
    pub data_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConf {
    pub mode: StoreMode,
    /// Base URL of the REST document store; required for `mode: rest`.
    pub endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Memory,
    Rest,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifierConf {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf {
                bind: "0.0.0.0:8080".into(),
            },
            mqtt: Some(MqttConf {
                host: "localhost".into(),
                port: 1883,
            }),
            store: StoreConf {
                mode: StoreMode::Memory,
                endpoint: None,
            },
            notifier: None,
            admin_email: "admin@localhost".into(),
            data_dir: "./data".into(),
        }
    }
}

/// Loads `kernel.yaml` (or `$PULSE_KERNEL_CONFIG`), falling back to the
/// defaults on a missing or invalid file.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PULSE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        warn!(path = %path, "no config file found, using defaults");
        return KernelConfig::default();
    }
    let text = fs::read_to_string(&path).await.unwrap_or_default();
    if text.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %path, error = %e, "invalid config file, using defaults");
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: KernelConfig = serde_yaml::from_str("admin_email: ops@plant.io\n").unwrap();
        assert_eq!(cfg.admin_email, "ops@plant.io");
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.store.mode, StoreMode::Memory);
    }

    #[test]
    fn rest_store_config_parses() {
        let yaml = r#"
store:
  mode: rest
  endpoint: https://pulse-demo.example.firebaseio.com
notifier:
  endpoint: https://api.emailjs.com/api/v1.0/email/send
  service_id: service_demo
  template_id: template_demo
  public_key: pk_demo
"#;
        let cfg: KernelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.store.mode, StoreMode::Rest);
        assert!(cfg.store.endpoint.unwrap().starts_with("https://"));
        assert_eq!(cfg.notifier.unwrap().service_id, "service_demo");
    }
}
