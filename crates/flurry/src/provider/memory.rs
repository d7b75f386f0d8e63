//! An in-memory provisioning API.
//!
//! Records every call, assigns identifiers the way the real services shape
//! them, treats repeated attachments as no-ops and can be told to reject
//! creates for chosen names. Backs the `simulate` command and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use flurry_core::topology::{
    Attachment, CreateRequest, ProvisioningApi, ResolvedResource, ResourceHandle, ResourceRef,
};

use crate::builder::kinds;
use crate::error::ProviderError;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ACCOUNT: &str = "123456789012";

#[derive(Debug, Default)]
struct State {
    creates: Vec<CreateRequest>,
    resources: HashMap<String, ResolvedResource>,
    attachments: HashMap<String, Vec<Attachment>>,
    attach_calls: usize,
}

#[derive(Debug)]
pub struct MemoryProvider {
    region: String,
    account: String,
    faults: HashMap<String, bool>,
    attach_faults: HashMap<String, bool>,
    state: Mutex<State>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_REGION, DEFAULT_ACCOUNT)
    }
}

impl MemoryProvider {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
            faults: HashMap::new(),
            attach_faults: HashMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Reject creates of resources named `name`.
    pub fn fail_on(mut self, name: impl Into<String>, retryable: bool) -> Self {
        self.faults.insert(name.into(), retryable);
        self
    }

    /// Reject grant attachments to the role named `name`. The role itself is
    /// still created.
    pub fn fail_on_attach(mut self, name: impl Into<String>, retryable: bool) -> Self {
        self.attach_faults.insert(name.into(), retryable);
        self
    }

    /// Every accepted create call, in call order.
    pub async fn creates(&self) -> Vec<CreateRequest> {
        self.state.lock().await.creates.clone()
    }

    pub async fn create_request(&self, resource: &ResourceRef) -> Option<CreateRequest> {
        self.state
            .lock()
            .await
            .creates
            .iter()
            .find(|request| &request.resource == resource)
            .cloned()
    }

    /// Distinct grants attached to `role`.
    pub async fn attachments(&self, role: &ResourceRef) -> Vec<Attachment> {
        self.state
            .lock()
            .await
            .attachments
            .get(&role.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of attach calls, including repeats.
    pub async fn attach_calls(&self) -> usize {
        self.state.lock().await.attach_calls
    }

    fn arn(&self, resource: &ResourceRef, name: &str) -> String {
        let (region, account) = (&self.region, &self.account);
        match resource.kind() {
            kinds::BUCKET => format!("arn:aws:s3:::{name}"),
            kinds::ROLE => format!("arn:aws:iam::{account}:role/{name}"),
            kinds::FUNCTION => format!("arn:aws:lambda:{region}:{account}:function:{name}"),
            kinds::LOG_GROUP => format!("arn:aws:logs:{region}:{account}:log-group:{name}"),
            kinds::DELIVERY_STREAM => {
                format!("arn:aws:firehose:{region}:{account}:deliverystream/{name}")
            }
            kinds::SOURCE_STREAM => format!("arn:aws:kinesis:{region}:{account}:stream/{name}"),
            kinds::METRIC_ALARM => format!("arn:aws:cloudwatch:{region}:{account}:alarm:{name}"),
            other => format!("arn:flurry:{region}:{account}:{other}/{name}"),
        }
    }
}

/// The physical name: the `name` property when present, else the logical name.
fn physical_name(request: &CreateRequest) -> String {
    request
        .properties
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(request.name())
        .to_string()
}

#[async_trait]
impl ProvisioningApi for MemoryProvider {
    async fn create(&self, request: CreateRequest) -> Result<ResourceHandle, ProviderError> {
        if let Some(&retryable) = self.faults.get(request.name()) {
            return Err(ProviderError::new(&request.resource, "injected fault", retryable));
        }

        let mut state = self.state.lock().await;
        let token = request.resource.to_string();
        if state.resources.contains_key(&token) {
            return Err(ProviderError::new(&request.resource, "resource already exists", false));
        }

        let name = physical_name(&request);
        let resolved = ResolvedResource {
            id: format!("{}-{:04}", request.name(), state.creates.len() + 1),
            arn: self.arn(&request.resource, &name),
            name,
            attributes: request.properties.as_object().cloned().unwrap_or_default(),
        };
        debug!(resource = %request.resource, id = %resolved.id, "Created");

        state.resources.insert(token.clone(), resolved);
        let handle = ResourceHandle {
            resource: request.resource.clone(),
            token,
        };
        state.creates.push(request);
        Ok(handle)
    }

    async fn resolve(&self, handle: &ResourceHandle) -> Result<ResolvedResource, ProviderError> {
        self.state
            .lock()
            .await
            .resources
            .get(&handle.token)
            .cloned()
            .ok_or_else(|| ProviderError::new(&handle.resource, "unknown handle", false))
    }

    async fn attach(&self, role: &ResourceHandle, grant: &Attachment) -> Result<(), ProviderError> {
        if let Some(&retryable) = self.attach_faults.get(role.resource.name()) {
            return Err(ProviderError::new(&role.resource, "injected attach fault", retryable));
        }
        let mut state = self.state.lock().await;
        if !state.resources.contains_key(&role.token) {
            return Err(ProviderError::new(&role.resource, "unknown role", false));
        }
        state.attach_calls += 1;

        let attached = state.attachments.entry(role.token.clone()).or_default();
        if !attached.contains(grant) {
            attached.push(grant.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(
        kind: flurry_core::topology::ResourceKind,
        name: &str,
        properties: Value,
    ) -> CreateRequest {
        CreateRequest {
            resource: ResourceRef::new(kind, name),
            properties,
            depends_on: vec![],
        }
    }

    #[tokio::test]
    async fn test_identifiers_follow_service_shapes() {
        let provider = MemoryProvider::default();
        let handle = provider
            .create(request(kinds::ROLE, "clicks-delivery-role", json!({})))
            .await
            .unwrap();
        let role = provider.resolve(&handle).await.unwrap();
        assert_eq!(role.arn, "arn:aws:iam::123456789012:role/clicks-delivery-role");

        let handle = provider
            .create(request(
                kinds::LOG_STREAM,
                "/aws/kinesisfirehose/clicks:S3Delivery",
                json!({"name": "S3Delivery"}),
            ))
            .await
            .unwrap();
        assert_eq!(provider.resolve(&handle).await.unwrap().name, "S3Delivery");
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let provider = MemoryProvider::default();
        let role = provider
            .create(request(kinds::ROLE, "worker", json!({})))
            .await
            .unwrap();
        let grant = Attachment::Managed {
            policy_arn: "arn:aws:iam::aws:policy/AWSLambda_FullAccess".to_string(),
        };

        provider.attach(&role, &grant).await.unwrap();
        provider.attach(&role, &grant).await.unwrap();

        assert_eq!(provider.attachments(&role.resource).await, vec![grant]);
        assert_eq!(provider.attach_calls().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_create_and_injected_faults() {
        let provider = MemoryProvider::default().fail_on("flaky", true);

        provider
            .create(request(kinds::BUCKET, "acme", json!({})))
            .await
            .unwrap();
        let err = provider
            .create(request(kinds::BUCKET, "acme", json!({})))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message.contains("already exists"));

        let err = provider
            .create(request(kinds::BUCKET, "flaky", json!({})))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.name, "flaky");
        assert_eq!(provider.creates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_attach_fault_keeps_role() {
        let provider = MemoryProvider::default().fail_on_attach("worker", false);
        let role = provider
            .create(request(kinds::ROLE, "worker", json!({})))
            .await
            .unwrap();
        let grant = Attachment::Managed {
            policy_arn: "arn:aws:iam::aws:policy/AWSLambda_FullAccess".to_string(),
        };

        let err = provider.attach(&role, &grant).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.name, "worker");
        assert!(provider.attachments(&role.resource).await.is_empty());
        assert!(provider.resolve(&role).await.is_ok());
    }
}
