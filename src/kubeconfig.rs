use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kube::config::{
    AuthInfo, Cluster, Context as ContextEntry, Kubeconfig, NamedAuthInfo, NamedCluster,
    NamedContext, NamedExtension,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::model::SpaceIngress;

pub const REFERENCE_NAME: &str = "upbound";
pub const PREVIOUS_REFERENCE_NAME: &str = "upbound-previous";
pub const CONTROL_PLANE_NAMESPACE: &str = "default";
pub const SPACE_EXTENSION_KEY: &str = "spaces.upbound.io/space";
pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1";
pub const UP_BINARY: &str = "up";

const SPACE_EXTENSION_API_VERSION: &str = "spaces.upbound.io/v1alpha1";
const SPACE_EXTENSION_KIND: &str = "SpaceExtension";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing ingress address for context")]
    MissingIngressHost,
    #[error("missing ingress CA for context")]
    MissingIngressCa,
    #[error("no auth info for context")]
    MissingCredential,
    #[error("hub context {0:?} was not found in kubeconfig")]
    UnknownHubContext(String),
    #[error("failed to encode space extension: {0}")]
    Extension(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn group(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: String::new(),
        }
    }

    pub fn control_plane(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub ingress: SpaceIngress,
    pub auth_info: Option<AuthInfo>,
    pub hub_context: Option<String>,
    pub extension: SpaceExtension,
}

// A namespaced resource targets the space API; a named one targets the
// control plane endpoint with the context namespace forced to `default`.
pub fn synthesize(
    base: &Kubeconfig,
    target: &ConnectionTarget,
    resource: &ResourceRef,
) -> Result<Kubeconfig, ConfigError> {
    if target.ingress.host.is_empty() {
        return Err(ConfigError::MissingIngressHost);
    }
    if target.ingress.ca_data.is_empty() {
        return Err(ConfigError::MissingIngressCa);
    }

    let (user, auth_info) = resolve_credential(base, target)?;

    let namespace = if resource.name.is_empty() {
        Some(resource.namespace.clone()).filter(|namespace| !namespace.is_empty())
    } else {
        Some(CONTROL_PLANE_NAMESPACE.to_string())
    };

    let extension = serde_json::to_value(&target.extension)
        .map_err(|error| ConfigError::Extension(error.to_string()))?;

    Ok(Kubeconfig {
        kind: Some("Config".to_string()),
        api_version: Some("v1".to_string()),
        current_context: Some(REFERENCE_NAME.to_string()),
        clusters: vec![NamedCluster {
            name: REFERENCE_NAME.to_string(),
            cluster: Some(Cluster {
                server: Some(spaces_k8s_url(&target.ingress.host, resource)),
                certificate_authority_data: Some(STANDARD.encode(&target.ingress.ca_data)),
                ..Default::default()
            }),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: user.clone(),
            auth_info: Some(auth_info),
        }],
        contexts: vec![NamedContext {
            name: REFERENCE_NAME.to_string(),
            context: Some(ContextEntry {
                cluster: REFERENCE_NAME.to_string(),
                user: Some(user),
                namespace,
                extensions: Some(vec![NamedExtension {
                    name: SPACE_EXTENSION_KEY.to_string(),
                    extension,
                }]),
                ..Default::default()
            }),
        }],
        ..Default::default()
    })
}

// Explicit credential first, then the user of the hub context.
fn resolve_credential(
    base: &Kubeconfig,
    target: &ConnectionTarget,
) -> Result<(String, AuthInfo), ConfigError> {
    if let Some(auth_info) = &target.auth_info {
        return Ok((REFERENCE_NAME.to_string(), auth_info.clone()));
    }

    let Some(hub) = target.hub_context.as_deref().filter(|name| !name.is_empty()) else {
        return Err(ConfigError::MissingCredential);
    };

    let hub_context = base
        .contexts
        .iter()
        .find(|named| named.name == hub)
        .and_then(|named| named.context.as_ref())
        .ok_or_else(|| ConfigError::UnknownHubContext(hub.to_string()))?;
    let user = hub_context
        .user
        .as_deref()
        .ok_or(ConfigError::MissingCredential)?;
    let auth_info = base
        .auth_infos
        .iter()
        .find(|named| named.name == user)
        .and_then(|named| named.auth_info.clone())
        .ok_or(ConfigError::MissingCredential)?;

    Ok((user.to_string(), auth_info))
}

pub fn spaces_k8s_url(host: &str, resource: &ResourceRef) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };

    if resource.name.is_empty() {
        return base;
    }
    format!(
        "{base}/apis/spaces.upbound.io/v1beta1/namespaces/{}/controlplanes/{}/k8s",
        resource.namespace, resource.name
    )
}

pub fn merge_into(mut base: Kubeconfig, synthesized: Kubeconfig) -> Kubeconfig {
    preserve_previous(&mut base);

    for cluster in synthesized.clusters {
        base.clusters.retain(|named| named.name != cluster.name);
        base.clusters.push(cluster);
    }
    for auth_info in synthesized.auth_infos {
        base.auth_infos.retain(|named| named.name != auth_info.name);
        base.auth_infos.push(auth_info);
    }
    for context in synthesized.contexts {
        base.contexts.retain(|named| named.name != context.name);
        base.contexts.push(context);
    }

    base.current_context = synthesized.current_context;
    if base.kind.is_none() {
        base.kind = Some("Config".to_string());
    }
    if base.api_version.is_none() {
        base.api_version = Some("v1".to_string());
    }
    base
}

fn preserve_previous(base: &mut Kubeconfig) {
    if !base.contexts.iter().any(|named| named.name == REFERENCE_NAME) {
        return;
    }

    base.contexts
        .retain(|named| named.name != PREVIOUS_REFERENCE_NAME);
    base.clusters
        .retain(|named| named.name != PREVIOUS_REFERENCE_NAME);
    base.auth_infos
        .retain(|named| named.name != PREVIOUS_REFERENCE_NAME);

    for named in base
        .clusters
        .iter_mut()
        .filter(|named| named.name == REFERENCE_NAME)
    {
        named.name = PREVIOUS_REFERENCE_NAME.to_string();
    }
    for named in base
        .auth_infos
        .iter_mut()
        .filter(|named| named.name == REFERENCE_NAME)
    {
        named.name = PREVIOUS_REFERENCE_NAME.to_string();
    }
    for named in base
        .contexts
        .iter_mut()
        .filter(|named| named.name == REFERENCE_NAME)
    {
        named.name = PREVIOUS_REFERENCE_NAME.to_string();
        if let Some(context) = named.context.as_mut() {
            if context.cluster == REFERENCE_NAME {
                context.cluster = PREVIOUS_REFERENCE_NAME.to_string();
            }
            if context.user.as_deref() == Some(REFERENCE_NAME) {
                context.user = Some(PREVIOUS_REFERENCE_NAME.to_string());
            }
        }
    }
    debug!("kept previous {REFERENCE_NAME} context as {PREVIOUS_REFERENCE_NAME}");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceExtension {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub spec: SpaceExtensionSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceExtensionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudSpaceExtension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected: Option<DisconnectedSpaceExtension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpaceExtension {
    pub organization: String,
    pub space_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectedSpaceExtension {
    pub hub_context: String,
}

impl SpaceExtension {
    pub fn cloud(organization: impl Into<String>, space_name: impl Into<String>) -> Self {
        Self::with_spec(SpaceExtensionSpec {
            cloud: Some(CloudSpaceExtension {
                organization: organization.into(),
                space_name: space_name.into(),
            }),
            disconnected: None,
        })
    }

    pub fn disconnected(hub_context: impl Into<String>) -> Self {
        Self::with_spec(SpaceExtensionSpec {
            cloud: None,
            disconnected: Some(DisconnectedSpaceExtension {
                hub_context: hub_context.into(),
            }),
        })
    }

    fn with_spec(spec: SpaceExtensionSpec) -> Self {
        Self {
            api_version: SPACE_EXTENSION_API_VERSION.to_string(),
            kind: SPACE_EXTENSION_KIND.to_string(),
            spec,
        }
    }

    pub fn from_context(context: &ContextEntry) -> Result<Option<Self>, serde_json::Error> {
        let Some(extension) = context
            .extensions
            .as_ref()
            .and_then(|extensions| {
                extensions
                    .iter()
                    .find(|named| named.name == SPACE_EXTENSION_KEY)
            })
        else {
            return Ok(None);
        };
        serde_json::from_value(extension.extension.clone()).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgCredential {
    pub command: String,
    pub organization: String,
    pub profile: String,
}

impl OrgCredential {
    pub fn for_organization(organization: &str, profile: &str) -> Result<Self> {
        Ok(Self {
            command: resolve_plugin_command()?,
            organization: organization.to_string(),
            profile: profile.to_string(),
        })
    }

    pub fn to_auth_info(&self) -> Result<AuthInfo> {
        serde_json::from_value(json!({
            "exec": {
                "apiVersion": EXEC_API_VERSION,
                "command": self.command,
                "args": ["organization", "token"],
                "env": [
                    { "name": "ORGANIZATION", "value": self.organization },
                    { "name": "UP_PROFILE", "value": self.profile },
                ],
                "interactiveMode": "IfAvailable",
            }
        }))
        .context("failed to build organization exec credential")
    }
}

fn resolve_plugin_command() -> Result<String> {
    let current = std::env::current_exe().context("failed to locate the running executable")?;
    let on_path = find_on_path(UP_BINARY);
    if on_path.is_some_and(|path| same_file(&path, &current)) {
        return Ok(UP_BINARY.to_string());
    }
    Ok(current.display().to_string())
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Kubeconfig>;
    fn save(&self, kubeconfig: &Kubeconfig) -> Result<()>;
    fn location(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn discover(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }

        if let Some(paths) = std::env::var_os("KUBECONFIG")
            && let Some(first) = std::env::split_paths(&paths)
                .find(|path| !path.as_os_str().is_empty())
        {
            return Ok(Self::new(first));
        }

        let home = std::env::var_os("HOME").context("HOME is not set; pass --kubeconfig")?;
        Ok(Self::new(PathBuf::from(home).join(".kube/config")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Kubeconfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "kubeconfig not found, starting empty");
            return Ok(Kubeconfig::default());
        }
        Kubeconfig::read_from(&self.path)
            .with_context(|| format!("failed to read kubeconfig {}", self.path.display()))
    }

    fn save(&self, kubeconfig: &Kubeconfig) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_yaml::to_string(kubeconfig).context("failed to serialize kubeconfig")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write kubeconfig {}", self.path.display()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CONTROL_PLANE_NAMESPACE, ConfigError, ConfigStore, ConnectionTarget, FileConfigStore,
        OrgCredential, PREVIOUS_REFERENCE_NAME, REFERENCE_NAME, ResourceRef, SpaceExtension,
        merge_into, spaces_k8s_url, synthesize,
    };
    use crate::model::SpaceIngress;
    use crate::testing::hub_kubeconfig;
    use kube::config::{AuthInfo, ExecInteractiveMode, Kubeconfig};

    fn ingress() -> SpaceIngress {
        SpaceIngress {
            host: "spaces.example.com".to_string(),
            ca_data: b"-----BEGIN CERTIFICATE-----".to_vec(),
        }
    }

    fn explicit_target() -> ConnectionTarget {
        ConnectionTarget {
            ingress: ingress(),
            auth_info: Some(AuthInfo {
                username: Some("robot".to_string()),
                ..Default::default()
            }),
            hub_context: None,
            extension: SpaceExtension::cloud("acme", "prod"),
        }
    }

    fn hub_target(hub: Option<&str>) -> ConnectionTarget {
        ConnectionTarget {
            ingress: ingress(),
            auth_info: None,
            hub_context: hub.map(str::to_string),
            extension: SpaceExtension::disconnected(hub.unwrap_or_default()),
        }
    }

    fn only_context(config: &Kubeconfig) -> &kube::config::Context {
        assert_eq!(config.contexts.len(), 1);
        config.contexts[0]
            .context
            .as_ref()
            .expect("synthesized context")
    }

    fn server(config: &Kubeconfig) -> String {
        config.clusters[0]
            .cluster
            .as_ref()
            .and_then(|cluster| cluster.server.clone())
            .expect("synthesized server")
    }

    #[test]
    fn namespace_only_points_at_space() {
        let config = synthesize(
            &Kubeconfig::default(),
            &explicit_target(),
            &ResourceRef::group("default"),
        )
        .expect("synthesized");

        assert_eq!(server(&config), "https://spaces.example.com");
        assert_eq!(only_context(&config).namespace.as_deref(), Some("default"));
        assert_eq!(config.current_context.as_deref(), Some(REFERENCE_NAME));
    }

    #[test]
    fn named_resource_points_at_control_plane() {
        let config = synthesize(
            &Kubeconfig::default(),
            &explicit_target(),
            &ResourceRef::control_plane("team-a", "ctp1"),
        )
        .expect("synthesized");

        assert_eq!(
            server(&config),
            concat!(
                "https://spaces.example.com/apis/spaces.upbound.io/v1beta1",
                "/namespaces/team-a/controlplanes/ctp1/k8s"
            )
        );
        assert_eq!(
            only_context(&config).namespace.as_deref(),
            Some(CONTROL_PLANE_NAMESPACE)
        );
    }

    #[test]
    fn host_with_scheme_is_kept() {
        assert_eq!(
            spaces_k8s_url("https://ingress.local/", &ResourceRef::default()),
            "https://ingress.local"
        );
    }

    #[test]
    fn empty_resource_leaves_namespace_unset() {
        let config = synthesize(
            &Kubeconfig::default(),
            &explicit_target(),
            &ResourceRef::default(),
        )
        .expect("synthesized");
        assert_eq!(only_context(&config).namespace, None);
    }

    #[test]
    fn missing_ingress_host_is_rejected() {
        let mut target = explicit_target();
        target.ingress.host.clear();
        let error = synthesize(&Kubeconfig::default(), &target, &ResourceRef::default())
            .expect_err("host is required");
        assert_eq!(error, ConfigError::MissingIngressHost);
    }

    #[test]
    fn missing_ingress_ca_is_rejected() {
        let mut target = explicit_target();
        target.ingress.ca_data.clear();
        let error = synthesize(&Kubeconfig::default(), &target, &ResourceRef::default())
            .expect_err("ca is required");
        assert_eq!(error, ConfigError::MissingIngressCa);
    }

    #[test]
    fn no_credential_source_is_rejected() {
        let error = synthesize(
            &hub_kubeconfig("hub", "hub-admin"),
            &hub_target(None),
            &ResourceRef::default(),
        )
        .expect_err("credential is required");
        assert_eq!(error, ConfigError::MissingCredential);
    }

    #[test]
    fn absent_hub_context_is_rejected() {
        let error = synthesize(
            &hub_kubeconfig("hub", "hub-admin"),
            &hub_target(Some("elsewhere")),
            &ResourceRef::default(),
        )
        .expect_err("hub context must exist");
        assert_eq!(
            error,
            ConfigError::UnknownHubContext("elsewhere".to_string())
        );
    }

    #[test]
    fn hub_credential_is_imported() {
        let config = synthesize(
            &hub_kubeconfig("hub", "hub-admin"),
            &hub_target(Some("hub")),
            &ResourceRef::group("team-a"),
        )
        .expect("synthesized");

        assert_eq!(only_context(&config).user.as_deref(), Some("hub-admin"));
        assert_eq!(config.auth_infos.len(), 1);
        assert_eq!(config.auth_infos[0].name, "hub-admin");
        let imported = config.auth_infos[0]
            .auth_info
            .as_ref()
            .and_then(|auth| auth.username.clone());
        assert_eq!(imported.as_deref(), Some("admin"));
    }

    #[test]
    fn explicit_credential_wins_over_hub() {
        let mut target = explicit_target();
        target.hub_context = Some("hub".to_string());
        let config = synthesize(
            &hub_kubeconfig("hub", "hub-admin"),
            &target,
            &ResourceRef::default(),
        )
        .expect("synthesized");

        assert_eq!(only_context(&config).user.as_deref(), Some(REFERENCE_NAME));
        let username = config.auth_infos[0]
            .auth_info
            .as_ref()
            .and_then(|auth| auth.username.clone());
        assert_eq!(username.as_deref(), Some("robot"));
    }

    #[test]
    fn extension_marks_cloud_and_disconnected_contexts() {
        let cloud = synthesize(
            &Kubeconfig::default(),
            &explicit_target(),
            &ResourceRef::default(),
        )
        .expect("synthesized");
        let marker = SpaceExtension::from_context(only_context(&cloud))
            .expect("decodes")
            .expect("present");
        assert_eq!(marker, SpaceExtension::cloud("acme", "prod"));

        let disconnected = synthesize(
            &hub_kubeconfig("hub", "hub-admin"),
            &hub_target(Some("hub")),
            &ResourceRef::default(),
        )
        .expect("synthesized");
        let marker = SpaceExtension::from_context(only_context(&disconnected))
            .expect("decodes")
            .expect("present");
        assert_eq!(
            marker.spec.disconnected.map(|spec| spec.hub_context),
            Some("hub".to_string())
        );
    }

    #[test]
    fn merge_keeps_previous_upbound_context() {
        let first = synthesize(
            &Kubeconfig::default(),
            &explicit_target(),
            &ResourceRef::default(),
        )
        .expect("synthesized");
        let merged = merge_into(hub_kubeconfig("hub", "hub-admin"), first);
        assert_eq!(merged.current_context.as_deref(), Some(REFERENCE_NAME));

        let second = synthesize(
            &merged,
            &explicit_target(),
            &ResourceRef::group("team-b"),
        )
        .expect("synthesized");
        let merged = merge_into(merged, second);

        let names = merged
            .contexts
            .iter()
            .map(|named| named.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["hub", PREVIOUS_REFERENCE_NAME, REFERENCE_NAME]);
        let previous = merged
            .contexts
            .iter()
            .find(|named| named.name == PREVIOUS_REFERENCE_NAME)
            .and_then(|named| named.context.as_ref())
            .expect("previous context");
        assert_eq!(previous.cluster, PREVIOUS_REFERENCE_NAME);
        assert_eq!(previous.user.as_deref(), Some(PREVIOUS_REFERENCE_NAME));
        assert_eq!(merged.clusters.len(), 3);
    }

    #[test]
    fn org_credential_builds_exec_plugin() {
        let credential = OrgCredential {
            command: "up".to_string(),
            organization: "acme".to_string(),
            profile: "default".to_string(),
        };
        let auth = credential.to_auth_info().expect("auth info");
        let exec = auth.exec.expect("exec config");

        assert_eq!(exec.api_version.as_deref(), Some(super::EXEC_API_VERSION));
        assert_eq!(exec.command.as_deref(), Some("up"));
        assert_eq!(
            exec.args,
            Some(vec!["organization".to_string(), "token".to_string()])
        );
        let env = exec.env.expect("env");
        assert_eq!(env[0].get("name").map(String::as_str), Some("ORGANIZATION"));
        assert_eq!(env[0].get("value").map(String::as_str), Some("acme"));
        assert_eq!(env[1].get("name").map(String::as_str), Some("UP_PROFILE"));
        assert!(matches!(
            exec.interactive_mode,
            Some(ExecInteractiveMode::IfAvailable)
        ));
    }

    #[test]
    fn file_store_round_trips_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileConfigStore::new(dir.path().join("nested/config"));
        assert!(store.load().expect("empty load").contexts.is_empty());

        store
            .save(&hub_kubeconfig("hub", "hub-admin"))
            .expect("saved");
        let loaded = store.load().expect("loaded");
        assert_eq!(loaded.current_context.as_deref(), Some("hub"));
        assert_eq!(loaded.contexts[0].name, "hub");
    }
}
