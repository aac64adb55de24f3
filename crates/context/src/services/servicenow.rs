//! ServiceNow change-request client (read-only)

use super::ChangeSource;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use netrag_common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeList {
    #[serde(default)]
    pub result: Vec<ChangeRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeRequest {
    pub sys_id: String,
    pub number: String,
    pub short_description: String,
    pub description: Option<String>,
    pub state: String,
    pub priority: String,
    pub risk: String,
    pub impact: String,
    pub assigned_to: String,
    pub requested_by: String,
    pub start_date: String,
    pub end_date: String,
}

impl ChangeRequest {
    /// Prompt-ready rendering of one change
    pub fn to_context(&self) -> String {
        let mut text = format!(
            "Change Request: {}\nDescription: {}\nState: {}\nPriority: {}\nRisk: {}\n\
             Impact: {}\nAssigned to: {}\nRequested by: {}\nStart: {}\nEnd: {}\n",
            self.number,
            self.short_description,
            self.state,
            self.priority,
            self.risk,
            self.impact,
            self.assigned_to,
            self.requested_by,
            self.start_date,
            self.end_date,
        );

        if let Some(details) = self.description.as_deref().filter(|d| !d.is_empty()) {
            text.push_str("Detailed Description:\n");
            text.push_str(details);
            text.push('\n');
        }

        text
    }
}

impl ChangeList {
    /// Payload served when ServiceNow is unreachable
    pub fn sample() -> Self {
        let now = Utc::now();
        Self {
            result: vec![ChangeRequest {
                sys_id: "CHG001".into(),
                number: "CHG0000001".into(),
                short_description: "Network Switch Upgrade".into(),
                description: Some("Upgrade network switches in the data center".into()),
                state: "new".into(),
                priority: "high".into(),
                risk: "medium".into(),
                impact: "high".into(),
                assigned_to: "John Smith".into(),
                requested_by: "Jane Doe".into(),
                start_date: now.to_rfc3339(),
                end_date: (now + ChronoDuration::days(1)).to_rfc3339(),
            }],
        }
    }
}

/// HTTP client for the `change_request` table API
pub struct ServiceNowService {
    client: reqwest::Client,
    base_url: String,
    limit: u32,
}

impl ServiceNowService {
    pub fn new(base_url: &str, timeout: Duration, limit: u32) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        })
    }

    async fn fetch(&self, query: &str) -> Result<ChangeList> {
        let url = format!("{}/api/now/table/change_request", self.base_url);
        let limit = self.limit.to_string();

        let mut params = vec![("sysparm_limit", limit.as_str()), ("sysparm_offset", "0")];
        if !query.trim().is_empty() {
            params.push(("sysparm_query", query));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;

        response.json().await.map_err(|e| AppError::Internal {
            message: format!("Unparsable ServiceNow response: {}", e),
        })
    }
}

#[async_trait]
impl ChangeSource for ServiceNowService {
    async fn changes(&self, query: &str) -> ChangeList {
        match self.fetch(query).await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, base_url = %self.base_url, "ServiceNow unavailable, using sample change list");
                ChangeList::sample()
            }
        }
    }
}
