//! Code-host aggregation: joins code hosts with user and site credentials,
//! optionally hides hosts that already have one, and pages the joined slice
//! in memory (the store hands over the full host set).

use std::sync::Arc;

use anyhow::Result;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::model::{CodeHost, Credential, UserId};
use crate::store::BatchesStore;

use super::connection::{PageInfo, SharedError};

/// A code host with the credential the viewer would use against it: the user
/// credential when one exists for the service id/type pair, otherwise the
/// site credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCodeHost {
    pub host: CodeHost,
    pub credential: Option<Credential>,
}

pub struct CodeHostConnection {
    store: Arc<dyn BatchesStore>,
    user_id: UserId,
    only_without_credential: bool,
    limit: i64,
    offset: i64,
    // Full post-filter join result; computed once per instance.
    hosts: OnceCell<Result<Vec<ResolvedCodeHost>, SharedError>>,
}

impl CodeHostConnection {
    pub fn new(
        store: Arc<dyn BatchesStore>,
        user_id: UserId,
        only_without_credential: bool,
        limit: i64,
        offset: i64,
    ) -> Self {
        Self {
            store,
            user_id,
            only_without_credential,
            limit,
            offset,
            hosts: OnceCell::new(),
        }
    }

    async fn compute(&self) -> Result<&Vec<ResolvedCodeHost>, SharedError> {
        self.hosts
            .get_or_init(|| async {
                self.join_credentials().await.map_err(SharedError::new)
            })
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    async fn join_credentials(&self) -> Result<Vec<ResolvedCodeHost>> {
        let hosts = self.store.list_code_hosts().await?;
        let user_creds = self.store.list_user_credentials(self.user_id).await?;
        let site_creds = self.store.list_site_credentials().await?;

        // Site credentials first so user credentials overwrite them.
        let mut by_service: FxHashMap<(String, String), Credential> = FxHashMap::default();
        for cred in site_creds.into_iter().chain(user_creds) {
            by_service.insert(
                (
                    cred.external_service_id.clone(),
                    cred.external_service_type.clone(),
                ),
                cred,
            );
        }

        Ok(hosts
            .into_iter()
            .map(|host| {
                let credential = by_service
                    .get(&(
                        host.external_service_id.clone(),
                        host.external_service_type.clone(),
                    ))
                    .cloned();
                ResolvedCodeHost { host, credential }
            })
            .filter(|resolved| !self.only_without_credential || resolved.credential.is_none())
            .collect())
    }

    /// The current page's hosts, sliced in memory after the join and filter.
    pub async fn nodes(&self) -> Result<Vec<ResolvedCodeHost>> {
        let hosts = self.compute().await?;
        let start = (self.offset.max(0) as usize).min(hosts.len());
        let end = if self.limit > 0 {
            (start + self.limit as usize).min(hosts.len())
        } else {
            hosts.len()
        };
        Ok(hosts[start..end].to_vec())
    }

    /// Post-filter, pre-paging count.
    pub async fn total_count(&self) -> Result<i64> {
        Ok(self.compute().await?.len() as i64)
    }

    /// The cursor is the raw next start index, since paging happens purely in
    /// memory after the join.
    pub async fn page_info(&self) -> Result<PageInfo> {
        let total = self.compute().await?.len() as i64;
        if self.limit > 0 && self.offset >= 0 && self.offset + self.limit < total {
            Ok(PageInfo::next(self.offset + self.limit))
        } else {
            Ok(PageInfo::done())
        }
    }
}
