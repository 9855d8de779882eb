//! Cloud providers hosting function deployments

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Provider a deployment runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Ibm,
    Google,
    Azure,
    Alibaba,
    Unknown,
}

impl_domain_status_conversions!(Provider {
    Aws => "aws",
    Ibm => "ibm",
    Google => "google",
    Azure => "azure",
    Alibaba => "alibaba",
    Unknown => "unknown",
});

impl Provider {
    /// Detect the provider from a deployment's external id (ARN or URL).
    pub fn detect(external_id: &str) -> Self {
        let id = external_id.to_ascii_lowercase();

        if id.starts_with("arn:aws:") {
            Self::Aws
        } else if id.contains("cloud.ibm.com")
            || id.contains("appdomain.cloud")
            || id.contains("functions.cloud.ibm")
        {
            Self::Ibm
        } else if id.contains("cloudfunctions.net") {
            Self::Google
        } else if id.contains("azurewebsites.net") {
            Self::Azure
        } else if id.contains("fc.aliyuncs.com") {
            Self::Alibaba
        } else {
            Self::Unknown
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}
