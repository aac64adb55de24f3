//! SD-WAN provider: organization and device configuration

use crate::provider::{
    ContextChunk, ContextPayload, ContextProvider, ProviderDescriptor, Selector, SourceLink,
};
use crate::services::{Device, NetworkConfigSource, Organization};
use async_trait::async_trait;
use netrag_common::{Metadata, Result};
use serde_json::json;
use std::sync::Arc;

const KEYWORDS: &[&str] = &[
    "sdwan",
    "network",
    "vlan",
    "device",
    "interface",
    "organization",
    "config",
    "status",
    "ip",
    "address",
];

pub struct NetworkProvider {
    source: Arc<dyn NetworkConfigSource>,
    selector: Selector,
    descriptor: ProviderDescriptor,
}

impl NetworkProvider {
    pub fn new(source: Arc<dyn NetworkConfigSource>) -> Self {
        Self::with_selector(source, Selector::keywords(KEYWORDS))
    }

    pub fn with_selector(source: Arc<dyn NetworkConfigSource>, selector: Selector) -> Self {
        Self {
            source,
            selector,
            descriptor: ProviderDescriptor::new(
                "SD-WAN Provider",
                "Handles queries about network configuration and status",
                &[
                    "Network device status",
                    "VLAN configuration",
                    "IP addressing",
                    "Interface status",
                    "Organization details",
                ],
                &[
                    "Cannot modify configurations",
                    "Read-only access",
                    "Limited to organization scope",
                ],
            ),
        }
    }
}

fn organization_text(org: &Organization) -> String {
    let devices: Vec<&str> = org.devices.iter().map(|d| d.name.as_str()).collect();
    format!(
        "Organization: {} (uid {})\nDevices: {}",
        org.name,
        org.uid,
        devices.join(", ")
    )
}

fn device_text(device: &Device) -> String {
    let vlans: Vec<String> = device
        .config
        .vlans
        .iter()
        .map(|v| format!("VLAN {} {} {}", v.id, v.name, v.ip))
        .collect();
    let interfaces: Vec<String> = device
        .config
        .interfaces
        .iter()
        .map(|i| format!("{} {} {}", i.name, i.ip, i.status))
        .collect();

    format!(
        "Device: {}\nModel: {}\nStatus: {}\nVLANs: {}\nInterfaces: {}",
        device.name,
        device.model,
        device.status,
        vlans.join(", "),
        interfaces.join(", ")
    )
}

#[async_trait]
impl ContextProvider for NetworkProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, query: &str) -> bool {
        self.selector.matches(query)
    }

    async fn get_context(&self, _query: &str) -> Result<ContextPayload> {
        let config = self.source.organization_config().await;
        let org = &config.organization;

        let mut chunks = vec![ContextChunk::plain(organization_text(org))];
        chunks.extend(org.devices.iter().map(|d| ContextChunk::plain(device_text(d))));

        let source_links = org
            .devices
            .iter()
            .map(|device| {
                let mut metadata = Metadata::new();
                metadata.insert("device_name".into(), json!(device.name));
                metadata.insert("model".into(), json!(device.model));
                metadata.insert("status".into(), json!(device.status));

                SourceLink {
                    provider: "SDWAN".to_string(),
                    link: Some(format!("/network/devices/{}", device.name)),
                    metadata,
                }
            })
            .collect();

        Ok(ContextPayload::new(chunks, source_links).with_data(serde_json::to_value(&config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::OrganizationConfig;

    struct SampleSource;

    #[async_trait]
    impl NetworkConfigSource for SampleSource {
        async fn organization_config(&self) -> OrganizationConfig {
            OrganizationConfig::sample()
        }
    }

    #[tokio::test]
    async fn test_context_covers_organization_and_devices() {
        let provider = NetworkProvider::new(Arc::new(SampleSource));
        let payload = provider.get_context("show me VLAN 100").await.unwrap();

        assert_eq!(payload.chunks.len(), 3);
        assert!(payload.chunks[0].text.starts_with("Organization: Big Data Org"));
        assert!(payload.chunks[1].text.contains("VLAN 100 Data 10.100.0.1/24"));
        assert!(payload.chunks[2].text.contains("Device: BRANCH1-EDGE-01"));
        assert!(!payload.fallback);

        let links: Vec<_> = payload
            .source_links
            .iter()
            .filter_map(|l| l.link.as_deref())
            .collect();
        assert_eq!(links, vec!["/network/devices/DC-EDGE-01", "/network/devices/BRANCH1-EDGE-01"]);
        assert_eq!(payload.source_links[0].metadata["model"], "vEdge-2000");
    }

    #[test]
    fn test_keywords() {
        let provider = NetworkProvider::new(Arc::new(SampleSource));
        assert!(provider.can_handle("What is the status of DC-EDGE-01?"));
        assert!(provider.can_handle("list SDWAN devices"));
        assert!(!provider.can_handle("summarize the onboarding doc"));
    }
}
