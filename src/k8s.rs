use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::ListParams;
use kube::config::{
    AuthInfo, Cluster, KubeConfigOptions, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, Config, ResourceExt};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Profile;
use crate::model::SpaceIngress;
use crate::upbound::{ContextProber, SpaceApi, SpaceCatalog, SpaceSummary};

pub const GROUP_LABEL: &str = "spaces.upbound.io/group";
pub const INGRESS_NAMESPACE: &str = "upbound-system";
pub const INGRESS_CONFIGMAP: &str = "ingress-public";
const INGRESS_HOST_KEY: &str = "ingress-host";
const INGRESS_CA_KEY: &str = "ingress-ca";
const CLOUD_CONTEXT: &str = "upbound-cloud";

pub async fn client_from_kubeconfig(
    kubeconfig: Kubeconfig,
    context: Option<&str>,
) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        cluster: None,
        user: None,
    };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("failed to infer Kubernetes configuration")?;
    Client::try_from(config).context("failed to initialize Kubernetes client")
}

fn space_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("upbound.io", "v1alpha1", "Space");
    ApiResource::from_gvk_with_plural(&gvk, "spaces")
}

fn control_plane_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("spaces.upbound.io", "v1beta1", "ControlPlane");
    ApiResource::from_gvk_with_plural(&gvk, "controlplanes")
}

#[derive(Debug, Clone)]
pub struct CloudSpaceCatalog {
    endpoint: String,
    session: Option<String>,
}

impl CloudSpaceCatalog {
    pub fn new(profile: &Profile) -> Self {
        Self {
            endpoint: profile.api_endpoint(),
            session: profile.session.clone(),
        }
    }

    fn kubeconfig(&self) -> Result<Kubeconfig> {
        let session = self
            .session
            .as_deref()
            .context("profile has no session; log in first")?;
        let auth_info: AuthInfo = serde_json::from_value(json!({ "token": session }))
            .context("failed to build session credential")?;

        Ok(Kubeconfig {
            current_context: Some(CLOUD_CONTEXT.to_string()),
            clusters: vec![NamedCluster {
                name: CLOUD_CONTEXT.to_string(),
                cluster: Some(Cluster {
                    server: Some(self.endpoint.clone()),
                    ..Default::default()
                }),
            }],
            auth_infos: vec![NamedAuthInfo {
                name: CLOUD_CONTEXT.to_string(),
                auth_info: Some(auth_info),
            }],
            contexts: vec![NamedContext {
                name: CLOUD_CONTEXT.to_string(),
                context: Some(kube::config::Context {
                    cluster: CLOUD_CONTEXT.to_string(),
                    user: Some(CLOUD_CONTEXT.to_string()),
                    ..Default::default()
                }),
            }],
            ..Default::default()
        })
    }
}

#[async_trait]
impl SpaceCatalog for CloudSpaceCatalog {
    async fn list_spaces(&self, organization: &str) -> Result<Vec<SpaceSummary>> {
        let client = client_from_kubeconfig(self.kubeconfig()?, None).await?;
        let spaces: Api<DynamicObject> =
            Api::namespaced_with(client, organization, &space_resource());
        let list = spaces.list(&ListParams::default()).await?;
        debug!(organization, count = list.items.len(), "listed spaces");
        Ok(list.into_iter().map(space_summary).collect())
    }
}

fn space_summary(space: DynamicObject) -> SpaceSummary {
    let text_at = |pointer: &str| {
        space
            .data
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    SpaceSummary {
        name: space.name_any(),
        labels: space.metadata.labels.clone().unwrap_or_default(),
        connection_status: text_at("/status/connectionDetails/status"),
        fqdn: text_at("/status/fqdn"),
        ca_bundle: text_at("/status/caBundle"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct KubeContextProber;

#[async_trait]
impl ContextProber for KubeContextProber {
    async fn probe(&self, kubeconfig: &Kubeconfig, context: &str) -> Result<Option<SpaceIngress>> {
        let client = client_from_kubeconfig(kubeconfig.clone(), Some(context)).await?;
        let config_maps: Api<ConfigMap> = Api::namespaced(client, INGRESS_NAMESPACE);
        let Some(config_map) = config_maps.get_opt(INGRESS_CONFIGMAP).await? else {
            return Ok(None);
        };
        Ok(ingress_from_config_map(&config_map))
    }
}

fn ingress_from_config_map(config_map: &ConfigMap) -> Option<SpaceIngress> {
    let data = config_map.data.as_ref()?;
    let host = data.get(INGRESS_HOST_KEY)?.trim().to_string();
    let ca_data = data.get(INGRESS_CA_KEY)?.clone().into_bytes();
    if host.is_empty() {
        return None;
    }
    Some(SpaceIngress { host, ca_data })
}

#[derive(Debug, Clone, Default)]
pub struct KubeSpaceApi;

#[async_trait]
impl SpaceApi for KubeSpaceApi {
    async fn list_groups(&self, kubeconfig: Kubeconfig) -> Result<Vec<String>> {
        let client = client_from_kubeconfig(kubeconfig, None).await?;
        let namespaces: Api<Namespace> = Api::all(client);
        let params = ListParams::default().labels(&format!("{GROUP_LABEL}=true"));
        let list = namespaces.list(&params).await?;
        Ok(list.into_iter().map(|namespace| namespace.name_any()).collect())
    }

    async fn list_control_planes(
        &self,
        kubeconfig: Kubeconfig,
        group: &str,
    ) -> Result<Vec<String>> {
        let client = client_from_kubeconfig(kubeconfig, None).await?;
        let control_planes: Api<DynamicObject> =
            Api::namespaced_with(client, group, &control_plane_resource());
        let list = control_planes.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|ctp| ctp.name_any()).collect())
    }
}
