use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use kube::config::Kubeconfig;

use crate::kubeconfig::ConfigStore;
use crate::model::SpaceIngress;
use crate::nav::NavContext;
use crate::upbound::{
    ContextProber, IngressError, IngressReader, OrganizationLister, OrganizationSummary, SpaceApi,
    SpaceCatalog, SpaceSummary,
};

pub fn hub_kubeconfig(context: &str, user: &str) -> Kubeconfig {
    let raw = format!(
        r#"
apiVersion: v1
kind: Config
clusters:
  - name: hub
    cluster:
      server: https://hub.example.com
contexts:
  - name: {context}
    context:
      cluster: hub
      user: {user}
users:
  - name: {user}
    user:
      username: admin
      password: secret
current-context: {context}
"#
    );
    serde_yaml::from_str(&raw).expect("valid kubeconfig")
}

pub fn space_summary(name: &str) -> SpaceSummary {
    SpaceSummary {
        name: name.to_string(),
        fqdn: Some(format!("{name}.spaces.example.com")),
        ca_bundle: Some("Q0E=".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedIngress {
    Ready,
    Unreachable,
    Fail(String),
    Hang,
}

#[derive(Debug, Clone)]
pub enum ScriptedProbe {
    Space,
    NotSpace,
    Fail,
    Hang,
}

struct StaticOrganizations(Result<Vec<OrganizationSummary>, String>);

#[async_trait]
impl OrganizationLister for StaticOrganizations {
    async fn list(&self) -> Result<Vec<OrganizationSummary>> {
        self.0.clone().map_err(|message| anyhow!(message))
    }
}

struct StaticCatalog {
    spaces: Vec<SpaceSummary>,
    fail: bool,
}

#[async_trait]
impl SpaceCatalog for StaticCatalog {
    async fn list_spaces(&self, _organization: &str) -> Result<Vec<SpaceSummary>> {
        if self.fail {
            return Err(anyhow!("forbidden"));
        }
        Ok(self.spaces.clone())
    }
}

struct ScriptedIngressReader(HashMap<String, ScriptedIngress>);

#[async_trait]
impl IngressReader for ScriptedIngressReader {
    async fn get(&self, space: &SpaceSummary) -> Result<SpaceIngress, IngressError> {
        match self.0.get(&space.name).cloned().unwrap_or(ScriptedIngress::Ready) {
            ScriptedIngress::Ready => Ok(SpaceIngress {
                host: space.fqdn.clone().unwrap_or_default(),
                ca_data: b"CA".to_vec(),
            }),
            ScriptedIngress::Unreachable => Err(IngressError::Unreachable),
            ScriptedIngress::Fail(message) => Err(IngressError::Other(anyhow!(message))),
            ScriptedIngress::Hang => std::future::pending().await,
        }
    }
}

struct ScriptedProber(HashMap<String, ScriptedProbe>);

#[async_trait]
impl ContextProber for ScriptedProber {
    async fn probe(&self, _kubeconfig: &Kubeconfig, context: &str) -> Result<Option<SpaceIngress>> {
        match self.0.get(context).cloned().unwrap_or(ScriptedProbe::NotSpace) {
            ScriptedProbe::Space => Ok(Some(SpaceIngress {
                host: format!("{context}.ingress.local"),
                ca_data: b"CA".to_vec(),
            })),
            ScriptedProbe::NotSpace => Ok(None),
            ScriptedProbe::Fail => Err(anyhow!("connection refused")),
            ScriptedProbe::Hang => std::future::pending().await,
        }
    }
}

pub struct RecordingSpaceApi {
    groups: Vec<String>,
    control_planes: Vec<String>,
    servers: Mutex<Vec<String>>,
}

impl RecordingSpaceApi {
    pub fn servers(&self) -> Vec<String> {
        self.servers.lock().expect("servers").clone()
    }

    fn record(&self, kubeconfig: &Kubeconfig) {
        let server = kubeconfig
            .clusters
            .first()
            .and_then(|named| named.cluster.as_ref())
            .and_then(|cluster| cluster.server.clone())
            .unwrap_or_default();
        self.servers.lock().expect("servers").push(server);
    }
}

#[async_trait]
impl SpaceApi for RecordingSpaceApi {
    async fn list_groups(&self, kubeconfig: Kubeconfig) -> Result<Vec<String>> {
        self.record(&kubeconfig);
        Ok(self.groups.clone())
    }

    async fn list_control_planes(
        &self,
        kubeconfig: Kubeconfig,
        _group: &str,
    ) -> Result<Vec<String>> {
        self.record(&kubeconfig);
        Ok(self.control_planes.clone())
    }
}

pub struct MemoryStore {
    kubeconfig: Mutex<Kubeconfig>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Kubeconfig {
        self.kubeconfig.lock().expect("kubeconfig").clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Kubeconfig> {
        Ok(self.current())
    }

    fn save(&self, kubeconfig: &Kubeconfig) -> Result<()> {
        *self.kubeconfig.lock().expect("kubeconfig") = kubeconfig.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

pub struct Fixture {
    pub organizations: Result<Vec<OrganizationSummary>, String>,
    pub spaces: Vec<SpaceSummary>,
    pub fail_space_listing: bool,
    pub ingress: HashMap<String, ScriptedIngress>,
    pub probes: HashMap<String, ScriptedProbe>,
    pub groups: Vec<String>,
    pub control_planes: Vec<String>,
    pub kubeconfig: Kubeconfig,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            organizations: Ok(Vec::new()),
            spaces: Vec::new(),
            fail_space_listing: false,
            ingress: HashMap::new(),
            probes: HashMap::new(),
            groups: Vec::new(),
            control_planes: Vec::new(),
            kubeconfig: Kubeconfig::default(),
        }
    }
}

pub struct Harness {
    pub ctx: NavContext,
    pub store: Arc<MemoryStore>,
    pub space_api: Arc<RecordingSpaceApi>,
}

impl Fixture {
    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore {
            kubeconfig: Mutex::new(self.kubeconfig),
            saves: AtomicUsize::new(0),
        });
        let space_api = Arc::new(RecordingSpaceApi {
            groups: self.groups,
            control_planes: self.control_planes,
            servers: Mutex::new(Vec::new()),
        });

        let ctx = NavContext {
            profile: "default".to_string(),
            organizations: Arc::new(StaticOrganizations(self.organizations)),
            spaces: Arc::new(StaticCatalog {
                spaces: self.spaces,
                fail: self.fail_space_listing,
            }),
            ingress: Arc::new(ScriptedIngressReader(self.ingress)),
            prober: Arc::new(ScriptedProber(self.probes)),
            space_api: space_api.clone(),
            store: store.clone(),
            ingress_timeout: Duration::from_secs(10),
        };

        Harness {
            ctx,
            store,
            space_api,
        }
    }
}
