//! Clients for the external domain services
//!
//! Each source degrades to a documented sample payload when its service is
//! unreachable, so providers never see a transport fault.

mod sdwan;
mod servicenow;

pub use sdwan::{Device, DeviceConfig, Interface, Organization, OrganizationConfig, SdwanService, Vlan};
pub use servicenow::{ChangeList, ChangeRequest, ServiceNowService};

use async_trait::async_trait;

/// Source of SD-WAN organization configuration
#[async_trait]
pub trait NetworkConfigSource: Send + Sync {
    async fn organization_config(&self) -> OrganizationConfig;
}

/// Source of change requests
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn changes(&self, query: &str) -> ChangeList;
}
