//! Porter Client
//!
//! HTTP client for a Porter discovery service. Porter samples nodes,
//! stores treasure maps and relays work orders to nodes on the client's
//! behalf.
//!
//! ```text
//! GET  /get_ursulas?quantity=n&include_ursulas=..&exclude_ursulas=..
//! POST /treasure_map          { treasure_map: hex }
//! GET  /treasure_map?hrac=..  → { result: { treasure_map: hex } }
//! POST /retrieve_cfrags       { node, work_order: hex } → { result: { reply: hex } }
//! ```
//!
//! Binary protocol objects travel as hex-encoded bincode.

use std::time::Duration;

use async_trait::async_trait;
use cbd_config::PorterConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::boundary::{BoundaryError, NodeDirectory, NodeQuery, ReencryptionClient};
use crate::codec::{from_hex, to_hex};
use crate::node::{NodeAddress, NodeInfo};
use crate::policy::hrac::Hrac;
use crate::policy::treasure_map::PublishedTreasureMap;
use crate::retrieval::work_order::{NodeReply, ReencryptionRequest};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct PorterClientConfig {
    /// Base URL, e.g. "https://porter-tapir.nucypher.community"
    pub uri: String,
    pub request_timeout: Duration,
}

impl From<&PorterConfig> for PorterClientConfig {
    fn from(config: &PorterConfig) -> Self {
        Self {
            uri: config.uri.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Porter response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PorterResponse<T> {
    pub result: T,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrsulasResult {
    pub ursulas: Vec<UrsulaInfo>,
}

/// Node record as Porter reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrsulaInfo {
    pub checksum_address: String,
    pub uri: String,
    /// Hex-encoded compressed secp256k1 PRE key
    pub encrypting_key: String,
    /// Hex-encoded compressed secp256k1 signing key
    pub verifying_key: String,
}

impl TryFrom<UrsulaInfo> for NodeInfo {
    type Error = BoundaryError;

    fn try_from(ursula: UrsulaInfo) -> Result<Self, Self::Error> {
        let decode_key = |hex_key: &str, what: &str| {
            hex::decode(hex_key)
                .ok()
                .and_then(|bytes| cbd_pre::key_from_bytes(&bytes).ok())
                .ok_or_else(|| {
                    BoundaryError::Malformed(format!("{} of {}", what, ursula.checksum_address))
                })
        };
        let encrypting_key = decode_key(&ursula.encrypting_key, "encrypting key")?;
        let verifying_key = decode_key(&ursula.verifying_key, "verifying key")?;

        Ok(NodeInfo {
            address: NodeAddress::new(&ursula.checksum_address),
            encrypting_key,
            verifying_key,
            uri: ursula.uri,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasureMapBody {
    pub treasure_map: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveCfragsRequest {
    pub node: String,
    pub work_order: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveCfragsResult {
    pub reply: String,
}

// ============================================================================
// Porter Client
// ============================================================================

pub struct PorterClient {
    config: PorterClientConfig,
    client: reqwest::Client,
}

impl PorterClient {
    pub fn new(config: PorterClientConfig) -> Result<Self, BoundaryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BoundaryError::Unreachable(format!("http client: {}", e)))?;
        info!("Porter client targeting {}", config.uri);
        Ok(Self { config, client })
    }

    pub fn uri(&self) -> &str {
        &self.config.uri
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.uri, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BoundaryError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BoundaryError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BoundaryError::Rejected(format!("{}: {}", status, body)));
        }
        let envelope: PorterResponse<T> = response.json().await.map_err(transport_error)?;
        Ok(envelope.result)
    }
}

fn transport_error(e: reqwest::Error) -> BoundaryError {
    if e.is_timeout() {
        BoundaryError::Timeout
    } else if e.is_decode() {
        BoundaryError::Malformed(e.to_string())
    } else {
        BoundaryError::Unreachable(e.to_string())
    }
}

/// Query string for `/get_ursulas`
pub fn ursulas_query(query: &NodeQuery) -> Vec<(&'static str, String)> {
    let join = |set: &std::collections::BTreeSet<NodeAddress>| {
        set.iter()
            .map(NodeAddress::as_str)
            .collect::<Vec<_>>()
            .join(",")
    };

    let mut params = vec![("quantity", query.quantity.to_string())];
    if !query.include.is_empty() {
        params.push(("include_ursulas", join(&query.include)));
    }
    if !query.exclude.is_empty() {
        params.push(("exclude_ursulas", join(&query.exclude)));
    }
    params
}

#[async_trait]
impl NodeDirectory for PorterClient {
    async fn get_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeInfo>, BoundaryError> {
        debug!("Sampling {} nodes from Porter", query.quantity);
        let response = self
            .client
            .get(self.url("get_ursulas"))
            .query(&ursulas_query(query))
            .send()
            .await
            .map_err(transport_error)?;

        let result: UrsulasResult = Self::read(response).await?;
        result.ursulas.into_iter().map(NodeInfo::try_from).collect()
    }

    async fn store_treasure_map(&self, map: &PublishedTreasureMap) -> Result<(), BoundaryError> {
        let body = TreasureMapBody {
            treasure_map: to_hex(map).map_err(|e| BoundaryError::Malformed(e.to_string()))?,
        };
        let response = self
            .client
            .post(self.url("treasure_map"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let _: serde_json::Value = Self::read(response).await?;
        info!("Stored treasure map {} with Porter", map.hrac());
        Ok(())
    }

    async fn get_treasure_map(&self, hrac: &Hrac) -> Result<PublishedTreasureMap, BoundaryError> {
        let response = self
            .client
            .get(self.url("treasure_map"))
            .query(&[("hrac", hrac.to_string())])
            .send()
            .await
            .map_err(transport_error)?;

        let body: TreasureMapBody = Self::read(response).await?;
        from_hex(&body.treasure_map).map_err(BoundaryError::Malformed)
    }
}

#[async_trait]
impl ReencryptionClient for PorterClient {
    async fn reencrypt(
        &self,
        node: &NodeInfo,
        request: &ReencryptionRequest,
    ) -> Result<NodeReply, BoundaryError> {
        let body = RetrieveCfragsRequest {
            node: node.address.to_string(),
            work_order: to_hex(request).map_err(|e| BoundaryError::Malformed(e.to_string()))?,
        };
        let response = self
            .client
            .post(self.url("retrieve_cfrags"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Work order to {} failed: {}", node.address, e);
                transport_error(e)
            })?;

        let result: RetrieveCfragsResult = Self::read(response).await?;
        from_hex(&result.reply).map_err(BoundaryError::Malformed)
    }
}
