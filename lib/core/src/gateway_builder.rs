use crate::error::GatewayError;
use crate::models::Config;
use crate::transport::http::HttpTransport;
use crate::transport::ProcessorTransport;
use crate::GatewayClient;
use std::sync::Arc;

/// Builder for creating and configuring a GatewayClient instance
pub struct GatewayBuilder {
    config: Config,
    transport: Option<Arc<dyn ProcessorTransport>>,
}

impl GatewayBuilder {
    /// Creates a new GatewayBuilder with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Sets a custom processor transport
    ///
    /// # Arguments
    ///
    /// * `transport` - The transport used to reach the processor
    ///
    /// # Returns
    ///
    /// The updated GatewayBuilder instance
    pub fn transport(mut self, transport: Arc<dyn ProcessorTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the GatewayClient instance
    ///
    /// Falls back to an [`HttpTransport`] built from the configuration when no
    /// transport was set.
    pub fn build(self) -> Result<GatewayClient, GatewayError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };

        Ok(GatewayClient::new(self.config, transport))
    }
}
