//! SD-WAN controller client

use super::NetworkConfigSource;
use async_trait::async_trait;
use netrag_common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub organization: Organization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config: DeviceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub vlans: Vec<Vlan>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub status: String,
}

impl OrganizationConfig {
    /// Payload served when the controller is unreachable
    pub fn sample() -> Self {
        let vlans = |data_ip: &str, voice_ip: &str| {
            vec![
                Vlan {
                    id: 100,
                    name: "Data".into(),
                    ip: data_ip.into(),
                },
                Vlan {
                    id: 200,
                    name: "Voice".into(),
                    ip: voice_ip.into(),
                },
            ]
        };
        let interface = |name: &str, ip: &str| Interface {
            name: name.into(),
            ip: ip.into(),
            status: "up".into(),
        };

        Self {
            organization: Organization {
                name: "Big Data Org".into(),
                uid: "1234".into(),
                devices: vec![
                    Device {
                        name: "DC-EDGE-01".into(),
                        model: "vEdge-2000".into(),
                        status: "active".into(),
                        config: DeviceConfig {
                            vlans: vlans("10.100.0.1/24", "10.200.0.1/24"),
                            interfaces: vec![
                                interface("GigE0/0", "192.168.1.1/24"),
                                interface("GigE0/1", "10.0.1.1/24"),
                            ],
                        },
                    },
                    Device {
                        name: "BRANCH1-EDGE-01".into(),
                        model: "vEdge-1000".into(),
                        status: "active".into(),
                        config: DeviceConfig {
                            vlans: vlans("10.101.0.1/24", "10.201.0.1/24"),
                            interfaces: vec![interface("GigE0/0", "192.168.2.1/24")],
                        },
                    },
                ],
            },
        }
    }
}

/// HTTP client for `GET {base}/organization/config`
pub struct SdwanService {
    client: reqwest::Client,
    base_url: String,
}

impl SdwanService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self) -> Result<OrganizationConfig> {
        let url = format!("{}/organization/config", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;

        response.json().await.map_err(|e| AppError::Internal {
            message: format!("Unparsable SD-WAN configuration: {}", e),
        })
    }
}

#[async_trait]
impl NetworkConfigSource for SdwanService {
    async fn organization_config(&self) -> OrganizationConfig {
        match self.fetch().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, base_url = %self.base_url, "SD-WAN controller unavailable, using sample configuration");
                OrganizationConfig::sample()
            }
        }
    }
}
