//! Stored aggregator configuration and its one-time resolution into
//! in-memory credentials.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::AggregatorName;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    Sandbox,
    Production,
}

impl ConfigValue {
    pub fn is_production(&self) -> bool {
        matches!(self, ConfigValue::Production)
    }
}

impl FromStr for ConfigValue {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sandbox" | "development" | "staging" | "" => Ok(ConfigValue::Sandbox),
            "production" | "live" => Ok(ConfigValue::Production),
            _ => Err(PaymentError::configuration(format!(
                "unknown aggregator environment: {}",
                value
            ))),
        }
    }
}

/// Credentials for one environment. `server_key` and `client_key` are
/// stored encrypted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub base_url: String,
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    pub server_key: String,
    #[serde(default)]
    pub client_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigJson {
    pub sandbox: ProviderCredentials,
    pub production: ProviderCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfiguration {
    pub aggregator: AggregatorName,
    pub environment: ConfigValue,
    pub config_json: ConfigJson,
}

pub trait SecretDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> PaymentResult<String>;
}

/// For keys that come from the environment and are not encrypted.
pub struct PlainSecrets;

impl SecretDecryptor for PlainSecrets {
    fn decrypt(&self, ciphertext: &str) -> PaymentResult<String> {
        Ok(ciphertext.to_string())
    }
}

#[derive(Clone)]
pub struct ResolvedCredentials {
    pub environment: ConfigValue,
    pub base_url: String,
    pub checkout_url: Option<String>,
    pub merchant_id: Option<String>,
    pub server_key: String,
    pub client_key: Option<String>,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("checkout_url", &self.checkout_url)
            .field("merchant_id", &self.merchant_id)
            .field("server_key", &"<redacted>")
            .finish()
    }
}

impl AggregatorConfiguration {
    pub fn resolve(&self, decryptor: &dyn SecretDecryptor) -> PaymentResult<ResolvedCredentials> {
        let selected = match self.environment {
            ConfigValue::Sandbox => &self.config_json.sandbox,
            ConfigValue::Production => &self.config_json.production,
        };

        if selected.server_key.trim().is_empty() {
            return Err(PaymentError::configuration(format!(
                "{} server key is not configured for {:?}",
                self.aggregator, self.environment
            )));
        }

        let server_key = decryptor
            .decrypt(&selected.server_key)
            .map_err(|e| e.context("decrypt server key"))?;
        let client_key = selected
            .client_key
            .as_deref()
            .map(|key| decryptor.decrypt(key))
            .transpose()
            .map_err(|e| e.context("decrypt client key"))?;

        Ok(ResolvedCredentials {
            environment: self.environment,
            base_url: selected.base_url.trim_end_matches('/').to_string(),
            checkout_url: selected
                .checkout_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            merchant_id: selected.merchant_id.clone(),
            server_key,
            client_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReverseDecryptor;

    impl SecretDecryptor for ReverseDecryptor {
        fn decrypt(&self, ciphertext: &str) -> PaymentResult<String> {
            Ok(ciphertext.chars().rev().collect())
        }
    }

    fn configuration(environment: ConfigValue) -> AggregatorConfiguration {
        AggregatorConfiguration {
            aggregator: AggregatorName::Midtrans,
            environment,
            config_json: ConfigJson {
                sandbox: ProviderCredentials {
                    base_url: "https://api.sandbox.midtrans.com/".to_string(),
                    checkout_url: None,
                    merchant_id: Some("G-SANDBOX".to_string()),
                    server_key: "xobdnas".to_string(),
                    client_key: None,
                },
                production: ProviderCredentials {
                    base_url: "https://api.midtrans.com".to_string(),
                    checkout_url: Some("https://app.midtrans.com".to_string()),
                    merchant_id: Some("G-PROD".to_string()),
                    server_key: "dorp".to_string(),
                    client_key: Some("tneilc".to_string()),
                },
            },
        }
    }

    #[test]
    fn environment_selects_credentials_and_decrypts_once() {
        let sandbox = configuration(ConfigValue::Sandbox)
            .resolve(&ReverseDecryptor)
            .expect("sandbox should resolve");
        assert_eq!(sandbox.server_key, "sandbox");
        assert_eq!(sandbox.base_url, "https://api.sandbox.midtrans.com");

        let production = configuration(ConfigValue::Production)
            .resolve(&ReverseDecryptor)
            .expect("production should resolve");
        assert_eq!(production.server_key, "prod");
        assert_eq!(production.client_key.as_deref(), Some("client"));
        assert_eq!(production.merchant_id.as_deref(), Some("G-PROD"));
    }

    #[test]
    fn empty_server_key_is_rejected() {
        let mut config = configuration(ConfigValue::Sandbox);
        config.config_json.sandbox.server_key = " ".to_string();
        assert!(config.resolve(&PlainSecrets).is_err());
    }

    #[test]
    fn debug_output_hides_keys() {
        let resolved = configuration(ConfigValue::Sandbox)
            .resolve(&PlainSecrets)
            .expect("should resolve");
        assert!(!format!("{:?}", resolved).contains("xobdnas"));
    }
}
