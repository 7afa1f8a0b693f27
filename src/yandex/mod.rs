//! Yandex Cloud REST implementation of [`CloudApi`].
//!
//! The backend talks to the public REST gateways of the compute, operation,
//! resource-manager, VPC and IAM services. Authentication is resolved once
//! when the backend is connected.

mod endpoints;
mod error;
mod iam;
mod transport;
mod wire;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::backend::{BackendFuture, CloudApi};
use crate::credentials::{CredentialResolver, Credentials};
use crate::machine::ApiConfig;
use crate::model::{
    Cloud, CreateInstanceRequest, Folder, Image, Instance, InstanceAction, Operation, Subnet,
};
use iam::IamTokenSource;
use transport::Transport;
use wire::{CloudPage, FolderPage, InstancePage, Page, SubnetPage};

pub use endpoints::Endpoints;
pub use error::YandexApiError;
pub use iam::sign_service_account_jwt;
pub use transport::{
    AttemptFailure, CLIENT_TRACE_ID_HEADER, REQUEST_ID_HEADER, RETRY_ATTEMPT_HEADER, RetryPolicy,
    USER_AGENT, is_transient,
};

/// Backend that manages instances through the Yandex Cloud REST API.
#[derive(Debug)]
pub struct YandexBackend {
    transport: Transport,
    endpoints: Endpoints,
    token: IamTokenSource,
}

impl YandexBackend {
    /// Creates a backend for already resolved credentials.
    #[must_use]
    pub fn new(endpoints: Endpoints, credentials: Credentials) -> Self {
        let token = IamTokenSource::new(credentials, endpoints.iam_tokens.clone());
        Self {
            transport: Transport::new(RetryPolicy::default()),
            endpoints,
            token,
        }
    }

    /// Resolves the endpoint override and credentials of `api` and creates a
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`YandexApiError::InvalidEndpoint`] for a malformed endpoint and
    /// [`YandexApiError::Credentials`] when no single credential resolves.
    pub async fn connect(api: &ApiConfig) -> Result<Self, YandexApiError> {
        let endpoints = Endpoints::from_override(api.endpoint.as_deref())?;
        let credentials = CredentialResolver::new(api.metadata_token_url.clone())
            .resolve(api)
            .await?;
        tracing::debug!(?credentials, "resolved credentials");
        Ok(Self::new(endpoints, credentials))
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport.set_policy(policy);
        self
    }

    /// Returns the endpoints in use.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, YandexApiError> {
        let token = self.token.token(&self.transport).await?;
        self.transport
            .send(&Method::GET, url, Some(&token), |builder| builder.query(query))
            .await
    }

    async fn post_operation<B>(&self, url: &str, body: &B) -> Result<Operation, YandexApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.token.token(&self.transport).await?;
        self.transport
            .send(&Method::POST, url, Some(&token), |builder| builder.json(body))
            .await
    }

    async fn list_all<P: Page>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<P::Item>, YandexApiError> {
        let mut items = Vec::new();
        let mut page_token = String::new();
        loop {
            let page: P = {
                let mut params = query.to_vec();
                if !page_token.is_empty() {
                    params.push(("pageToken", page_token.as_str()));
                }
                self.get(url, &params).await?
            };
            let (mut batch, next) = page.into_parts();
            items.append(&mut batch);
            if next.is_empty() {
                return Ok(items);
            }
            page_token = next;
        }
    }
}

/// Builds a `name = "..."` filter expression, escaping quotes and backslashes.
fn name_filter(name: &str) -> String {
    let mut filter = String::with_capacity(name.len() + 9);
    filter.push_str("name = \"");
    for ch in name.chars() {
        if matches!(ch, '"' | '\\') {
            filter.push('\\');
        }
        filter.push(ch);
    }
    filter.push('"');
    filter
}

impl CloudApi for YandexBackend {
    type Error = YandexApiError;

    fn list_clouds(&self) -> BackendFuture<'_, Vec<Cloud>, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/clouds", self.endpoints.resource_manager);
            self.list_all::<CloudPage>(&url, &[]).await
        })
    }

    fn list_folders<'a>(
        &'a self,
        cloud_id: &'a str,
    ) -> BackendFuture<'a, Vec<Folder>, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/folders", self.endpoints.resource_manager);
            self.list_all::<FolderPage>(&url, &[("cloudId", cloud_id)])
                .await
        })
    }

    fn get_folder<'a>(&'a self, folder_id: &'a str) -> BackendFuture<'a, Folder, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/folders/{folder_id}", self.endpoints.resource_manager);
            self.get(&url, &[]).await
        })
    }

    fn list_subnets<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> BackendFuture<'a, Vec<Subnet>, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/subnets", self.endpoints.vpc);
            self.list_all::<SubnetPage>(&url, &[("folderId", folder_id)])
                .await
        })
    }

    fn find_instances_by_name<'a>(
        &'a self,
        folder_id: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Vec<Instance>, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/instances", self.endpoints.compute);
            let filter = name_filter(name);
            self.list_all::<InstancePage>(&url, &[("folderId", folder_id), ("filter", &filter)])
                .await
        })
    }

    fn latest_image_by_family<'a>(
        &'a self,
        folder_id: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, Image, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/images:latestByFamily", self.endpoints.compute);
            self.get(&url, &[("folderId", folder_id), ("family", family)])
                .await
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/instances", self.endpoints.compute);
            self.post_operation(&url, request).await
        })
    }

    fn get_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Instance, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/instances/{instance_id}", self.endpoints.compute);
            self.get(&url, &[]).await
        })
    }

    fn instance_action<'a>(
        &'a self,
        instance_id: &'a str,
        action: InstanceAction,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = format!(
                "{}/instances/{instance_id}:{}",
                self.endpoints.compute,
                action.as_str()
            );
            self.post_operation(&url, &json!({})).await
        })
    }

    fn delete_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/instances/{instance_id}", self.endpoints.compute);
            let token = self.token.token(&self.transport).await?;
            self.transport
                .send(&Method::DELETE, &url, Some(&token), |builder| builder)
                .await
        })
    }

    fn get_operation<'a>(
        &'a self,
        operation_id: &'a str,
    ) -> BackendFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = format!("{}/{operation_id}", self.endpoints.operation);
            self.get(&url, &[]).await
        })
    }
}
