use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use tokio::process::Command;
use tracing::{debug, info};

pub const CNPG_CHART: &str = "cloudnative-pg";
pub const CNPG_VERSION: &str = "0.21.5";
pub const CNPG_REPO: &str = "https://cloudnative-pg.github.io/charts";
pub const CNPG_NAMESPACE: &str = "cnpg-system";
pub const CNPG_CRD: &str = "clusters.postgresql.cnpg.io";
pub const CNPG_SELECTOR: &str = "app.kubernetes.io/name=cloudnative-pg";

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[async_trait]
pub trait Prerequisite: Send + Sync {
    fn name(&self) -> &str;
    async fn is_installed(&self) -> Result<bool>;
    async fn install(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub name: String,
    pub repo: String,
    pub namespace: String,
    pub version: String,
}

#[async_trait]
pub trait ChartInstaller: Send + Sync {
    async fn install(&self, chart: &Chart) -> Result<()>;
}

#[async_trait]
pub trait OperatorCluster: Send + Sync {
    async fn has_crd(&self, name: &str) -> Result<bool>;
    async fn create_namespace(&self, name: &str) -> Result<()>;
    async fn pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;
}

#[derive(Clone)]
pub struct KubeOperatorCluster {
    client: Client,
}

impl KubeOperatorCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperatorCluster for KubeOperatorCluster {
    async fn has_crd(&self, name: &str) -> Result<bool> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd = crds
            .get_opt(name)
            .await
            .with_context(|| format!("cannot get custom resource definition {name}"))?;
        Ok(crd.is_some())
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &namespace).await {
            Ok(_) => Ok(()),
            Err(error) if is_already_exists(&error) => {
                debug!(namespace = name, "namespace already exists");
                Ok(())
            }
            Err(error) => {
                Err(error).with_context(|| format!("failed to create namespace {name}"))
            }
        }
    }

    async fn pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(selector))
            .await
            .with_context(|| format!("cannot list pods in namespace {namespace}"))?;
        Ok(list.items)
    }
}

fn is_already_exists(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
    kubeconfig: Option<String>,
    context: Option<String>,
}

impl HelmCli {
    pub fn new(kubeconfig: Option<String>, context: Option<String>) -> Self {
        Self {
            binary: "helm".to_string(),
            kubeconfig,
            context,
        }
    }

    fn args(&self, chart: &Chart) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            chart.name.clone(),
            chart.name.clone(),
            "--repo".to_string(),
            chart.repo.clone(),
            "--version".to_string(),
            chart.version.clone(),
            "--namespace".to_string(),
            chart.namespace.clone(),
        ];
        if let Some(kubeconfig) = &self.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.clone()]);
        }
        if let Some(context) = &self.context {
            args.extend(["--kube-context".to_string(), context.clone()]);
        }
        args
    }
}

#[async_trait]
impl ChartInstaller for HelmCli {
    async fn install(&self, chart: &Chart) -> Result<()> {
        let args = self.args(chart);
        debug!(binary = %self.binary, ?args, "running helm");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "helm install of {} failed ({}): {}",
                chart.name,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

pub struct CloudNativePg {
    cluster: Box<dyn OperatorCluster>,
    charts: Box<dyn ChartInstaller>,
}

impl CloudNativePg {
    pub fn new(cluster: Box<dyn OperatorCluster>, charts: Box<dyn ChartInstaller>) -> Self {
        Self { cluster, charts }
    }

    fn chart() -> Chart {
        Chart {
            name: CNPG_CHART.to_string(),
            repo: CNPG_REPO.to_string(),
            namespace: CNPG_NAMESPACE.to_string(),
            version: CNPG_VERSION.to_string(),
        }
    }

    async fn operator_ready(&self) -> Result<bool> {
        let pods = self.cluster.pods(CNPG_NAMESPACE, CNPG_SELECTOR).await?;
        let [pod] = pods.as_slice() else {
            debug!(count = pods.len(), "waiting for a single cloudnative-pg pod");
            return Ok(false);
        };
        Ok(pod_is_ready(pod))
    }
}

#[async_trait]
impl Prerequisite for CloudNativePg {
    fn name(&self) -> &str {
        CNPG_CHART
    }

    async fn is_installed(&self) -> Result<bool> {
        self.cluster.has_crd(CNPG_CRD).await
    }

    async fn install(&self) -> Result<()> {
        if self.is_installed().await? {
            info!("{CNPG_CHART} is already installed");
            return Ok(());
        }

        self.cluster.create_namespace(CNPG_NAMESPACE).await?;
        self.charts
            .install(&Self::chart())
            .await
            .with_context(|| format!("failed to install chart {CNPG_CHART}"))?;
        poll_until(POLL_INTERVAL, READY_TIMEOUT, || self.operator_ready())
            .await
            .context("failed to wait for cloudnative-pg pod to be ready")?;
        info!("{CNPG_CHART} {CNPG_VERSION} is ready");
        Ok(())
    }
}

pub fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.type_ == "Ready")
        })
        .is_some_and(|condition| condition.status == "True")
}

async fn poll_until<F, Fut>(interval: Duration, deadline: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    tokio::time::timeout(deadline, async {
        loop {
            if check().await? {
                return anyhow::Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await
    .with_context(|| format!("timed out after {deadline:?}"))?
}
