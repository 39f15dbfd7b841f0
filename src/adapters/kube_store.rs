//! [`ResourceStore`] backed by the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

use super::{Lookup, ResourceStore};
use crate::crd::{Kubegres, KubegresRestore};
use crate::error::{Error, Result};

/// Namespaced resource access through a `kube::Client`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    namespace: String,
}

impl KubeStore {
    /// Create a store scoped to one namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_pod(&self, name: &str) -> Result<Lookup<Pod>> {
        Ok(self.api::<Pod>().get_opt(name).await?.into())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>> {
        let pods = self
            .api::<Pod>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(pods.items)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        self.api::<Pod>()
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| Error::from_write(e, format!("pod {}", pod.name_any())))
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        match self.api::<Pod>().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!(pod = name, "Pod already deleted");
                Ok(())
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn get_job(&self, name: &str) -> Result<Lookup<Job>> {
        Ok(self.api::<Job>().get_opt(name).await?.into())
    }

    async fn create_job(&self, job: &Job) -> Result<Job> {
        self.api::<Job>()
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| Error::from_write(e, format!("job {}", job.name_any())))
    }

    async fn get_pvc(&self, name: &str) -> Result<Lookup<PersistentVolumeClaim>> {
        Ok(self
            .api::<PersistentVolumeClaim>()
            .get_opt(name)
            .await?
            .into())
    }

    async fn get_config_map(&self, name: &str) -> Result<Lookup<ConfigMap>> {
        Ok(self.api::<ConfigMap>().get_opt(name).await?.into())
    }

    async fn get_cluster(&self, name: &str) -> Result<Lookup<Kubegres>> {
        Ok(self.api::<Kubegres>().get_opt(name).await?.into())
    }

    async fn create_cluster(&self, cluster: &Kubegres) -> Result<Kubegres> {
        self.api::<Kubegres>()
            .create(&PostParams::default(), cluster)
            .await
            .map_err(|e| Error::from_write(e, format!("Kubegres {}", cluster.name_any())))
    }

    async fn replace_cluster(&self, cluster: &Kubegres) -> Result<Kubegres> {
        let name = cluster.name_any();
        self.api::<Kubegres>()
            .replace(&name, &PostParams::default(), cluster)
            .await
            .map_err(|e| Error::from_write(e, format!("Kubegres {}", name)))
    }

    async fn list_stateful_sets(&self, selector: &str) -> Result<Vec<StatefulSet>> {
        let sets = self
            .api::<StatefulSet>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(sets.items)
    }

    async fn list_services(&self, selector: &str) -> Result<Vec<Service>> {
        let services = self
            .api::<Service>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(services.items)
    }

    async fn replace_restore_status(&self, restore: &KubegresRestore) -> Result<KubegresRestore> {
        let name = restore.name_any();
        let data = serde_json::to_vec(restore)?;
        self.api::<KubegresRestore>()
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|e| Error::from_write(e, format!("KubegresRestore {} status", name)))
    }
}
