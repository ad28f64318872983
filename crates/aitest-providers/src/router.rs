//! Vendor dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use aitest_core::{InvocationError, InvocationOutput, InvocationRequest, ModelInvoker};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::anthropic::AnthropicClient;
use crate::config::{Credentials, ProviderConfig, Vendor};
use crate::error::Result;
use crate::openai::OpenAiClient;

/// Routes each request to the client registered for its vendor.
#[derive(Default)]
pub struct ProviderRouter {
    clients: HashMap<Vendor, Arc<dyn ModelInvoker>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a client for every vendor with a key, using env endpoint overrides.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let mut router = Self::new();
        if let Some(key) = credentials.key_for(Vendor::OpenAi) {
            let client = OpenAiClient::new(key, ProviderConfig::from_env(Vendor::OpenAi))?;
            router = router.with_client(Vendor::OpenAi, Arc::new(client));
        }
        if let Some(key) = credentials.key_for(Vendor::Anthropic) {
            let client = AnthropicClient::new(key, ProviderConfig::from_env(Vendor::Anthropic))?;
            router = router.with_client(Vendor::Anthropic, Arc::new(client));
        }
        info!(vendors = ?router.configured(), "provider router ready");
        Ok(router)
    }

    pub fn with_client(mut self, vendor: Vendor, client: Arc<dyn ModelInvoker>) -> Self {
        self.clients.insert(vendor, client);
        self
    }

    pub fn is_configured(&self, vendor: Vendor) -> bool {
        self.clients.contains_key(&vendor)
    }

    /// Configured vendors in declaration order.
    pub fn configured(&self) -> Vec<Vendor> {
        Vendor::ALL
            .into_iter()
            .filter(|v| self.is_configured(*v))
            .collect()
    }
}

#[async_trait]
impl ModelInvoker for ProviderRouter {
    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError> {
        let vendor: Vendor = request
            .vendor
            .parse()
            .map_err(|_| InvocationError::UnsupportedVendor(request.vendor.clone()))?;
        let client = self
            .clients
            .get(&vendor)
            .ok_or_else(|| InvocationError::NotConfigured(vendor.to_string()))?;
        debug!(%vendor, model = %request.model, "dispatching invocation");
        client.invoke(request).await
    }
}
