//! Terminal step of every filter chain: send the exchange upstream.

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::Dispatch;
use crate::http::client::HttpClient;
use crate::http::error::GatewayResult;
use crate::http::exchange::{strip_hop_by_hop, Exchange};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Arc<dyn HttpClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, exchange: Exchange) -> GatewayResult {
        let request_id = exchange.attributes().request_id.clone();
        let request = exchange.into_upstream_request()?;

        tracing::debug!(
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
            "Dispatching upstream"
        );

        let mut response = self.client.send(request).await?;
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}
