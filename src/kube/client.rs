//! `ClusterClient` implementation over kube-rs.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Namespace};
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::ApiResource;
use kube::discovery::{Discovery, Scope};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::kubernetes::{sort_events_newest_first, EventObject, K8sEvent};

use super::resolver::{KindResolver, ResolvedKind};
use super::resource::RawResource;
use super::{ApiGroupResources, ApiResourceInfo, ClusterClient};

/// Kubernetes client backed by the dynamic API, with kind resolution and a
/// TTL-bounded discovery cache.
pub struct KubeClusterClient {
    client: kube::Client,
    resolver: KindResolver,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client, resolver: KindResolver::default() }
    }

    /// Connect using the ambient kubeconfig or in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .map_err(|err| Error::upstream("kubernetes", err))?;
        Ok(Self::new(client))
    }

    /// Cheap connectivity probe used by the health endpoint.
    pub async fn check_connectivity(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.list(&ListParams::default().limit(1))
            .await
            .map_err(|err| Error::upstream("kubernetes", err))?;
        Ok(())
    }

    /// Run a discovery pass and return the catalog in capability form.
    async fn discovery_snapshot(&self) -> Result<Vec<ApiGroupResources>> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|err| Error::upstream("kubernetes", err))?;

        let mut catalog = Vec::new();
        for group in discovery.groups() {
            let version = group.preferred_version_or_latest();
            let mut resources = Vec::new();
            for (ar, caps) in group.recommended_resources() {
                resources.push(ApiResourceInfo {
                    name: ar.plural.clone(),
                    singular_name: String::new(),
                    kind: ar.kind.clone(),
                    verbs: caps.operations.iter().map(|op| op.to_string()).collect(),
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                });
            }
            if !resources.is_empty() {
                catalog.push(ApiGroupResources {
                    group_version: if group.name().is_empty() {
                        version.to_string()
                    } else {
                        format!("{}/{}", group.name(), version)
                    },
                    resources,
                });
            }
        }
        Ok(catalog)
    }

    /// Resolve a kind, refreshing the discovery cache on miss or expiry.
    async fn resolve(&self, kind: &str) -> Result<ResolvedKind> {
        if !self.resolver.needs_refresh() {
            if let Some(resolved) = self.resolver.resolve_cached(kind) {
                return Ok(resolved);
            }
        }
        debug!(kind = %kind, "kind not cached, refreshing discovery");
        let catalog = self.discovery_snapshot().await?;
        self.resolver.update(&catalog);
        self.resolver.resolve_or_unknown(kind)
    }

    fn dynamic_api(&self, resolved: &ResolvedKind, namespace: &str) -> Api<DynamicObject> {
        let ar = ApiResource {
            group: resolved.group.clone(),
            version: resolved.version.clone(),
            api_version: resolved.api_version(),
            kind: resolved.kind.clone(),
            plural: resolved.plural.clone(),
        };
        if resolved.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }
}

fn map_kube_error(what: String, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(what),
        kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 => {
            Error::UpstreamAuth { service: "kubernetes", message: resp.message }
        }
        other => Error::upstream("kubernetes", other),
    }
}

fn convert_event(event: Event) -> K8sEvent {
    K8sEvent {
        reason: event.reason.unwrap_or_default(),
        message: event.message.unwrap_or_default(),
        event_type: event.type_.unwrap_or_default(),
        count: i64::from(event.count.unwrap_or_default()),
        first_time: event.first_timestamp.map(|t| t.0),
        last_time: event.last_timestamp.map(|t| t.0),
        object: EventObject {
            kind: event.involved_object.kind.unwrap_or_default(),
            name: event.involved_object.name.unwrap_or_default(),
            namespace: event.involved_object.namespace.unwrap_or_default(),
        },
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn discover(&self) -> Result<Vec<ApiGroupResources>> {
        let catalog = self.discovery_snapshot().await?;
        self.resolver.update(&catalog);
        Ok(catalog)
    }

    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<RawResource> {
        let resolved = self.resolve(kind).await?;
        let api = self.dynamic_api(&resolved, namespace);
        let object = api
            .get(name)
            .await
            .map_err(|err| map_kube_error(format!("{kind} {namespace}/{name}"), err))?;
        let value = serde_json::to_value(&object)?;
        Ok(RawResource::new(value))
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<RawResource>> {
        let resolved = self.resolve(kind).await?;
        let api = self.dynamic_api(&resolved, namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| map_kube_error(format!("{kind} list in {namespace:?}"), err))?;
        debug!(kind = %kind, namespace = %namespace, count = list.items.len(), "listed resources");
        list.items
            .into_iter()
            .map(|object| Ok(RawResource::new(serde_json::to_value(&object)?)))
            .collect()
    }

    async fn events(&self, namespace: &str, kind: &str, name: &str) -> Result<Vec<K8sEvent>> {
        let api: Api<Event> = if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        };

        let mut selectors = Vec::new();
        if !name.is_empty() {
            selectors.push(format!("involvedObject.name={name}"));
        }
        if !kind.is_empty() {
            // The field selector is exact; canonicalize `pod` -> `Pod`.
            let canonical = self.resolve(kind).await?.kind;
            selectors.push(format!("involvedObject.kind={canonical}"));
        }
        if !namespace.is_empty() && !name.is_empty() {
            selectors.push(format!("involvedObject.namespace={namespace}"));
        }

        let mut params = ListParams::default();
        if !selectors.is_empty() {
            params = params.fields(&selectors.join(","));
        }

        let list = api
            .list(&params)
            .await
            .map_err(|err| map_kube_error(format!("events for {kind}/{name}"), err))?;
        let mut events: Vec<K8sEvent> = list.items.into_iter().map(convert_event).collect();
        sort_events_newest_first(&mut events);
        Ok(events)
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| Error::upstream("kubernetes", err))?;
        Ok(list.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }
}
