use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sovereign cloud hosting the tenant. Decides which login authority and
/// Graph endpoint are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudEnvironment {
    #[default]
    AzureCloud,
    AzureUSGovernment,
    AzureChinaCloud,
}

impl CloudEnvironment {
    pub fn authority_host(self) -> &'static str {
        match self {
            CloudEnvironment::AzureCloud => "https://login.microsoftonline.com",
            CloudEnvironment::AzureUSGovernment => "https://login.microsoftonline.us",
            CloudEnvironment::AzureChinaCloud => "https://login.chinacloudapi.cn",
        }
    }

    pub fn graph_endpoint(self) -> &'static str {
        match self {
            CloudEnvironment::AzureCloud => "https://graph.microsoft.com",
            CloudEnvironment::AzureUSGovernment => "https://graph.microsoft.us",
            CloudEnvironment::AzureChinaCloud => "https://microsoftgraph.chinacloudapi.cn",
        }
    }

    /// The fixed scope requested for Graph tokens.
    pub fn graph_default_scope(self) -> String {
        format!("{}/.default", self.graph_endpoint())
    }
}

impl FromStr for CloudEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azurecloud" | "public" => Ok(CloudEnvironment::AzureCloud),
            "azureusgovernment" | "usgov" => Ok(CloudEnvironment::AzureUSGovernment),
            "azurechinacloud" | "china" => Ok(CloudEnvironment::AzureChinaCloud),
            other => Err(format!("unknown cloud environment '{other}'")),
        }
    }
}
