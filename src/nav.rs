use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::config::Kubeconfig;
use ratatui::text::{Line, Span};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::breadcrumb::{BreadcrumbStyle, plain_text, to_line};
use crate::kubeconfig::{
    ConfigStore, ConnectionTarget, OrgCredential, ResourceRef, SpaceExtension, merge_into,
    synthesize,
};
use crate::model::{Item, ItemAction, SpaceIngress, sort_items};
use crate::pool::{self, MAX_WORKERS, Outcome};
use crate::upbound::{
    ContextProber, IngressError, IngressReader, OrganizationLister, SpaceApi, SpaceCatalog,
    SpaceSummary,
};

pub const DISCONNECTED_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const ORGANIZATIONS_UNAVAILABLE: &str = "Could not list Upbound organizations; are you logged in?";
const DISCONNECTED_ENTRY: &str = "Disconnected Spaces";

#[derive(Clone)]
pub struct NavContext {
    pub profile: String,
    pub organizations: Arc<dyn OrganizationLister>,
    pub spaces: Arc<dyn SpaceCatalog>,
    pub ingress: Arc<dyn IngressReader>,
    pub prober: Arc<dyn ContextProber>,
    pub space_api: Arc<dyn SpaceApi>,
    pub store: Arc<dyn ConfigStore>,
    pub ingress_timeout: Duration,
}

#[async_trait]
pub trait Navigable: Send + Sync {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>>;

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>>;

    fn breadcrumbs(&self) -> Line<'static> {
        to_line(self.breadcrumbs_with(&BreadcrumbStyle::default()))
    }
}

pub trait Back: Navigable {
    fn back(&self) -> Node;
    fn back_label(&self) -> &'static str;

    fn back_item(&self) -> Item {
        Item::back_to(self.back_label())
    }
}

#[async_trait]
pub trait Accepting: Navigable {
    async fn accept(&self, ctx: &NavContext) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Root(Root),
    Disconnected(Disconnected),
    Organization(Organization),
    Space(Space),
    Group(Group),
    ControlPlane(ControlPlane),
}

impl Node {
    pub fn as_navigable(&self) -> &dyn Navigable {
        match self {
            Self::Root(node) => node,
            Self::Disconnected(node) => node,
            Self::Organization(node) => node,
            Self::Space(node) => node,
            Self::Group(node) => node,
            Self::ControlPlane(node) => node,
        }
    }

    pub fn as_back(&self) -> Option<&dyn Back> {
        match self {
            Self::Root(_) => None,
            Self::Disconnected(node) => Some(node),
            Self::Organization(node) => Some(node),
            Self::Space(node) => Some(node),
            Self::Group(node) => Some(node),
            Self::ControlPlane(node) => Some(node),
        }
    }

    pub fn as_accepting(&self) -> Option<&dyn Accepting> {
        match self {
            Self::Space(node) => Some(node),
            Self::Group(node) => Some(node),
            Self::ControlPlane(node) => Some(node),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    node: Node,
}

impl Default for Session {
    fn default() -> Self {
        Self::at(Node::Root(Root))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Moved(Session),
    Terminated(String),
}

impl Session {
    pub fn at(node: Node) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        self.node.as_navigable().items(ctx).await
    }

    pub fn breadcrumbs(&self) -> Line<'static> {
        self.node.as_navigable().breadcrumbs()
    }

    // Never mutates the receiver, so a failed accept keeps the caller in place.
    pub async fn apply(&self, action: &ItemAction, ctx: &NavContext) -> Result<Step> {
        match action {
            ItemAction::Navigate(node) => Ok(Step::Moved(Self::at(node.clone()))),
            ItemAction::Back => {
                let node = self
                    .node
                    .as_back()
                    .context("the root node has no parent")?
                    .back();
                Ok(Step::Moved(Self::at(node)))
            }
            ItemAction::Accept => {
                let accepting = self
                    .node
                    .as_accepting()
                    .context("this node cannot be accepted")?;
                Ok(Step::Terminated(accepting.accept(ctx).await?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Root;

#[async_trait]
impl Navigable for Root {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        let mut items = Vec::new();

        match ctx.organizations.list().await {
            Ok(organizations) => {
                let mut entries = organizations
                    .into_iter()
                    .map(|org| {
                        let text = if org.display_name.is_empty() {
                            org.name.clone()
                        } else {
                            org.display_name
                        };
                        Item::new(text)
                            .kind("organization")
                            .matching_terms([org.name.clone()])
                            .on_enter(ItemAction::Navigate(Node::Organization(Organization {
                                name: org.name,
                            })))
                    })
                    .collect::<Vec<_>>();
                sort_items(&mut entries);
                items.extend(entries);
            }
            Err(error) => {
                warn!("failed to list organizations: {error:#}");
                items.push(Item::new(ORGANIZATIONS_UNAVAILABLE).unselectable());
            }
        }

        items.push(
            Item::new(DISCONNECTED_ENTRY)
                .matching_terms(["disconnected"])
                .padding_top(1)
                .on_enter(ItemAction::Navigate(Node::Disconnected(Disconnected))),
        );
        Ok(items)
    }

    fn breadcrumbs_with(&self, _style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disconnected;

#[async_trait]
impl Navigable for Disconnected {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        let base = Arc::new(ctx.store.load().context("failed to read kubeconfig")?);
        let found = Arc::new(Mutex::new(Vec::new()));

        let mut probes = JoinSet::new();
        for named in &base.contexts {
            let Some(context) = named.context.as_ref() else {
                continue;
            };
            // Contexts written for a space belong to the cloud tree.
            if !matches!(SpaceExtension::from_context(context), Ok(None)) {
                debug!(context = %named.name, "skipping context created for a space");
                continue;
            }

            let name = named.name.clone();
            let base = Arc::clone(&base);
            let prober = Arc::clone(&ctx.prober);
            let found = Arc::clone(&found);
            probes.spawn(async move {
                let probed =
                    tokio::time::timeout(DISCONNECTED_PROBE_TIMEOUT, prober.probe(&base, &name))
                        .await;
                match probed {
                    Ok(Ok(Some(ingress))) => {
                        let item = disconnected_space_item(name, ingress);
                        found
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(item);
                    }
                    Ok(Ok(None)) => debug!(context = %name, "context is not a space"),
                    Ok(Err(error)) => debug!(context = %name, "probe failed: {error:#}"),
                    Err(_) => debug!(context = %name, "probe timed out"),
                }
            });
        }

        while let Some(joined) = probes.join_next().await {
            if let Err(error) = joined {
                warn!("context probe failed: {error}");
            }
        }

        let mut spaces = std::mem::take(&mut *found.lock().unwrap_or_else(PoisonError::into_inner));
        sort_items(&mut spaces);

        let mut items = Vec::with_capacity(spaces.len() + 1);
        items.push(self.back_item());
        items.extend(spaces);
        Ok(items)
    }

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        vec![style.current("disconnected/")]
    }
}

impl Back for Disconnected {
    fn back(&self) -> Node {
        Node::Root(Root)
    }

    fn back_label(&self) -> &'static str {
        "home"
    }
}

fn disconnected_space_item(context: String, ingress: SpaceIngress) -> Item {
    let space = Space {
        org: None,
        name: context.clone(),
        ingress,
        credential: None,
        hub_context: Some(context.clone()),
    };
    Item::new(context)
        .kind("space")
        .on_enter(ItemAction::Navigate(Node::Space(space)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
}

#[async_trait]
impl Navigable for Organization {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        let spaces = ctx
            .spaces
            .list_spaces(&self.name)
            .await
            .with_context(|| format!("failed to list spaces in organization {}", self.name))?;
        let credential = OrgCredential::for_organization(&self.name, &ctx.profile)?;

        let mut unselectable = Vec::new();
        let mut pending = Vec::with_capacity(spaces.len());
        for space in spaces {
            if space.is_legacy() {
                debug!(space = %space.name, "skipping legacy space");
            } else if space.is_unreachable() {
                unselectable.push(unreachable_item(&space.name));
            } else {
                pending.push(space);
            }
        }

        let org = self.clone();
        let reader = Arc::clone(&ctx.ingress);
        let timeout = ctx.ingress_timeout;
        let buckets = pool::fetch_all(pending, MAX_WORKERS, move |space: SpaceSummary| {
            let org = org.clone();
            let credential = credential.clone();
            let reader = Arc::clone(&reader);
            async move { resolve_space(reader, org, credential, space, timeout).await }
        })
        .await;

        let mut selectable = buckets.selectable;
        unselectable.extend(buckets.unselectable);
        sort_items(&mut selectable);
        sort_items(&mut unselectable);

        let mut items = Vec::with_capacity(selectable.len() + unselectable.len() + 1);
        items.push(self.back_item());
        items.extend(selectable);
        items.extend(unselectable);
        Ok(items)
    }

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        vec![style.current(format!("{}/", self.name))]
    }
}

impl Back for Organization {
    fn back(&self) -> Node {
        Node::Root(Root)
    }

    fn back_label(&self) -> &'static str {
        "home"
    }
}

async fn resolve_space(
    reader: Arc<dyn IngressReader>,
    org: Organization,
    credential: OrgCredential,
    space: SpaceSummary,
    timeout: Duration,
) -> Outcome<Item> {
    let resolved = match tokio::time::timeout(timeout, reader.get(&space)).await {
        Ok(resolved) => resolved,
        Err(_) => {
            debug!(space = %space.name, ?timeout, "ingress resolution timed out");
            Err(IngressError::Unreachable)
        }
    };

    match resolved {
        Ok(ingress) => {
            let node = Node::Space(Space {
                org: Some(org),
                name: space.name.clone(),
                ingress,
                credential: Some(credential),
                hub_context: None,
            });
            Outcome::Selectable(
                Item::new(space.name)
                    .kind("space")
                    .on_enter(ItemAction::Navigate(node)),
            )
        }
        Err(IngressError::Unreachable) => Outcome::Unselectable(unreachable_item(&space.name)),
        Err(IngressError::Other(error)) => Outcome::Unselectable(
            Item::new(format!("{} (error: {error})", space.name))
                .kind("space")
                .unselectable(),
        ),
    }
}

fn unreachable_item(name: &str) -> Item {
    Item::new(format!("{name} (unreachable)"))
        .kind("space")
        .unselectable()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub org: Option<Organization>,
    pub name: String,
    pub ingress: SpaceIngress,
    pub credential: Option<OrgCredential>,
    pub hub_context: Option<String>,
}

impl Space {
    pub fn is_cloud(&self) -> bool {
        self.org.as_ref().is_some_and(|org| !org.name.is_empty())
    }

    fn connection_target(&self) -> Result<ConnectionTarget> {
        let auth_info = self
            .credential
            .as_ref()
            .map(OrgCredential::to_auth_info)
            .transpose()?;
        let extension = match &self.org {
            Some(org) if self.is_cloud() => SpaceExtension::cloud(&org.name, &self.name),
            _ => SpaceExtension::disconnected(self.hub_context.clone().unwrap_or_default()),
        };
        Ok(ConnectionTarget {
            ingress: self.ingress.clone(),
            auth_info,
            hub_context: self.hub_context.clone(),
            extension,
        })
    }

    fn kubeconfig(&self, ctx: &NavContext, resource: &ResourceRef) -> Result<Kubeconfig> {
        let base = ctx.store.load().context("failed to read kubeconfig")?;
        Ok(synthesize(&base, &self.connection_target()?, resource)?)
    }

    fn switch_context(
        &self,
        ctx: &NavContext,
        resource: &ResourceRef,
        path: &Line<'_>,
    ) -> Result<String> {
        let base = ctx.store.load().context("failed to read kubeconfig")?;
        let synthesized = synthesize(&base, &self.connection_target()?, resource)?;
        ctx.store.save(&merge_into(base, synthesized))?;

        let path = plain_text(path);
        let path = path.trim_end_matches('/');
        info!(path, kubeconfig = %ctx.store.location(), "switched kubeconfig context");
        Ok(format!("Switched kubeconfig context to: {path}"))
    }
}

#[async_trait]
impl Navigable for Space {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        let kubeconfig = self.kubeconfig(ctx, &ResourceRef::default())?;
        let groups = ctx
            .space_api
            .list_groups(kubeconfig)
            .await
            .with_context(|| format!("failed to list groups in space {}", self.name))?;

        let mut items = Vec::with_capacity(groups.len() + 3);
        items.push(self.back_item());
        if groups.is_empty() {
            items.push(Item::new("No groups found").unselectable());
        }
        for name in groups {
            let group = Group {
                space: self.clone(),
                name: name.clone(),
            };
            items.push(
                Item::new(name)
                    .kind("group")
                    .on_enter(ItemAction::Navigate(Node::Group(group))),
            );
        }
        items.push(
            Item::new(format!("Switch context to {:?}", self.name)).on_enter(ItemAction::Accept),
        );
        Ok(items)
    }

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        let mut spans = match &self.org {
            Some(org) if self.is_cloud() => org.breadcrumbs_with(&style.dimmed()),
            _ => Disconnected.breadcrumbs_with(&style.dimmed()),
        };
        spans.push(style.current(format!("{}/", self.name)));
        spans
    }
}

impl Back for Space {
    fn back(&self) -> Node {
        match &self.org {
            Some(org) if self.is_cloud() => Node::Organization(org.clone()),
            _ => Node::Disconnected(Disconnected),
        }
    }

    fn back_label(&self) -> &'static str {
        "spaces"
    }
}

#[async_trait]
impl Accepting for Space {
    async fn accept(&self, ctx: &NavContext) -> Result<String> {
        self.switch_context(ctx, &ResourceRef::default(), &self.breadcrumbs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub space: Space,
    pub name: String,
}

#[async_trait]
impl Navigable for Group {
    async fn items(&self, ctx: &NavContext) -> Result<Vec<Item>> {
        let kubeconfig = self
            .space
            .kubeconfig(ctx, &ResourceRef::group(&self.name))?;
        let control_planes = ctx
            .space_api
            .list_control_planes(kubeconfig, &self.name)
            .await
            .with_context(|| format!("failed to list control planes in group {}", self.name))?;

        let mut items = Vec::with_capacity(control_planes.len() + 3);
        items.push(self.back_item());
        if control_planes.is_empty() {
            items.push(
                Item::new(format!("No control planes found in group {:?}", self.name))
                    .unselectable(),
            );
        }
        for name in control_planes {
            let control_plane = ControlPlane {
                group: self.clone(),
                name: name.clone(),
            };
            items.push(
                Item::new(name)
                    .kind("controlplane")
                    .on_enter(ItemAction::Navigate(Node::ControlPlane(control_plane))),
            );
        }
        items.push(
            Item::new(format!(
                "Switch context to {:?}",
                format!("{}/{}", self.space.name, self.name)
            ))
            .on_enter(ItemAction::Accept),
        );
        Ok(items)
    }

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        let mut spans = self.space.breadcrumbs_with(&style.dimmed());
        spans.push(style.current(format!("{}/", self.name)));
        spans
    }
}

impl Back for Group {
    fn back(&self) -> Node {
        Node::Space(self.space.clone())
    }

    fn back_label(&self) -> &'static str {
        "groups"
    }
}

#[async_trait]
impl Accepting for Group {
    async fn accept(&self, ctx: &NavContext) -> Result<String> {
        self.space
            .switch_context(ctx, &ResourceRef::group(&self.name), &self.breadcrumbs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlane {
    pub group: Group,
    pub name: String,
}

#[async_trait]
impl Navigable for ControlPlane {
    async fn items(&self, _ctx: &NavContext) -> Result<Vec<Item>> {
        Ok(vec![
            self.back_item(),
            Item::new(format!("Connect to {:?} and quit", self.name)).on_enter(ItemAction::Accept),
        ])
    }

    fn breadcrumbs_with(&self, style: &BreadcrumbStyle) -> Vec<Span<'static>> {
        let mut spans = self.group.breadcrumbs_with(&style.dimmed());
        spans.push(style.current(self.name.clone()));
        spans
    }
}

impl Back for ControlPlane {
    fn back(&self) -> Node {
        Node::Group(self.group.clone())
    }

    fn back_label(&self) -> &'static str {
        "controlplanes"
    }
}

#[async_trait]
impl Accepting for ControlPlane {
    async fn accept(&self, ctx: &NavContext) -> Result<String> {
        let resource = ResourceRef::control_plane(&self.group.name, &self.name);
        self.group
            .space
            .switch_context(ctx, &resource, &self.breadcrumbs())
    }
}
