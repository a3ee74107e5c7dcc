use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kube::config::Kubeconfig;
use serde::Deserialize;
use tracing::debug;

use crate::config::Profile;
use crate::model::SpaceIngress;

pub const SPACE_MODE_LABEL: &str = "spaces.upbound.io/mode";
pub const LEGACY_MODE: &str = "legacy";
pub const CONNECTION_UNREACHABLE: &str = "Unreachable";

const USER_AGENT: &str = concat!("spacectx/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub connection_status: Option<String>,
    pub fqdn: Option<String>,
    pub ca_bundle: Option<String>,
}

impl SpaceSummary {
    pub fn is_legacy(&self) -> bool {
        self.labels
            .get(SPACE_MODE_LABEL)
            .is_some_and(|mode| mode == LEGACY_MODE)
    }

    pub fn is_unreachable(&self) -> bool {
        self.connection_status.as_deref() == Some(CONNECTION_UNREACHABLE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("space is unreachable")]
    Unreachable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait OrganizationLister: Send + Sync {
    async fn list(&self) -> Result<Vec<OrganizationSummary>>;
}

#[async_trait]
pub trait SpaceCatalog: Send + Sync {
    async fn list_spaces(&self, organization: &str) -> Result<Vec<SpaceSummary>>;
}

#[async_trait]
pub trait IngressReader: Send + Sync {
    async fn get(&self, space: &SpaceSummary) -> Result<SpaceIngress, IngressError>;
}

#[async_trait]
pub trait ContextProber: Send + Sync {
    async fn probe(&self, kubeconfig: &Kubeconfig, context: &str) -> Result<Option<SpaceIngress>>;
}

#[async_trait]
pub trait SpaceApi: Send + Sync {
    async fn list_groups(&self, kubeconfig: Kubeconfig) -> Result<Vec<String>>;
    async fn list_control_planes(&self, kubeconfig: Kubeconfig, group: &str)
    -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct UpboundOrganizations {
    http: reqwest::Client,
    api_endpoint: String,
    session: Option<String>,
}

impl UpboundOrganizations {
    pub fn new(profile: &Profile) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to initialize HTTP client")?;
        Ok(Self {
            http,
            api_endpoint: profile.api_endpoint(),
            session: profile.session.clone(),
        })
    }
}

#[async_trait]
impl OrganizationLister for UpboundOrganizations {
    async fn list(&self) -> Result<Vec<OrganizationSummary>> {
        let Some(session) = self.session.as_deref() else {
            anyhow::bail!("profile has no session; log in first");
        };

        let url = format!("{}/v1/organizations", self.api_endpoint);
        let organizations = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, format!("SID={session}"))
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()
            .context("organization listing was rejected")?
            .json::<Vec<OrganizationSummary>>()
            .await
            .context("failed to decode organizations")?;
        debug!(count = organizations.len(), "listed organizations");
        Ok(organizations)
    }
}

#[derive(Debug, Clone)]
pub struct PublicIngressReader {
    timeout: Duration,
}

impl PublicIngressReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl IngressReader for PublicIngressReader {
    async fn get(&self, space: &SpaceSummary) -> Result<SpaceIngress, IngressError> {
        let host = space
            .fqdn
            .clone()
            .filter(|fqdn| !fqdn.is_empty())
            .ok_or(IngressError::Unreachable)?;
        let ca_bundle = space
            .ca_bundle
            .as_deref()
            .filter(|bundle| !bundle.is_empty())
            .ok_or_else(|| anyhow!("space has not published an ingress CA"))?;
        let ca_data = STANDARD
            .decode(ca_bundle.trim())
            .context("ingress CA is not valid base64")?;

        let certificate =
            reqwest::Certificate::from_pem(&ca_data).context("ingress CA is not valid PEM")?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .add_root_certificate(certificate)
            .timeout(self.timeout)
            .build()
            .context("failed to initialize HTTP client")?;

        match http.get(format!("https://{host}/livez")).send().await {
            Ok(response) => {
                debug!(space = %space.name, status = %response.status(), "space ingress answered");
                Ok(SpaceIngress { host, ca_data })
            }
            Err(error) if error.is_connect() || error.is_timeout() => {
                debug!(space = %space.name, "space ingress unreachable: {error}");
                Err(IngressError::Unreachable)
            }
            Err(error) => Err(IngressError::Other(
                anyhow::Error::new(error).context("failed to reach space ingress"),
            )),
        }
    }
}
