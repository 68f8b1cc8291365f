//! JSON query routing

use std::sync::Arc;

use relaycraft_core::{Address, EvidenceType, Relay, SessionHeader};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{RelayError, RelayService, Result};

pub const QUERY_RECEIPT: &str = "receipt";
pub const QUERY_RECEIPTS: &str = "receipts";
pub const QUERY_SUPPORTED_BLOCKCHAINS: &str = "supportedBlockchains";
pub const QUERY_PARAMETERS: &str = "parameters";
pub const QUERY_RELAY: &str = "relay";
pub const QUERY_DISPATCH: &str = "dispatch";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReceiptParams {
    pub address: Address,
    pub header: SessionHeader,
    pub evidence_type: EvidenceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReceiptsParams {
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRelayParams {
    pub relay: Relay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDispatchParams {
    pub header: SessionHeader,
}

/// Routes `(path, JSON params)` to the relay service and returns indented JSON
pub struct Querier {
    service: Arc<RelayService>,
}

fn parse<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| RelayError::InvalidQuery(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| RelayError::Encode(e.to_string()))
}

impl Querier {
    pub fn new(service: Arc<RelayService>) -> Self {
        Self { service }
    }

    pub async fn query(&self, path: &str, data: &[u8]) -> Result<Vec<u8>> {
        match path {
            QUERY_RECEIPT => {
                let params: QueryReceiptParams = parse(data)?;
                let receipt = self
                    .service
                    .receipt(&params.address, &params.header, params.evidence_type)?;
                encode(&receipt)
            }
            QUERY_RECEIPTS => {
                let params: QueryReceiptsParams = parse(data)?;
                encode(&self.service.receipts(&params.address)?)
            }
            QUERY_SUPPORTED_BLOCKCHAINS => encode(&self.service.supported_blockchains()),
            QUERY_PARAMETERS => encode(&self.service.parameters()),
            QUERY_RELAY => {
                let params: QueryRelayParams = parse(data)?;
                encode(&self.service.handle_relay(params.relay).await?)
            }
            QUERY_DISPATCH => {
                let params: QueryDispatchParams = parse(data)?;
                encode(&self.service.dispatch(params.header)?)
            }
            other => Err(RelayError::UnknownQuery(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relaycraft_core::{
        Application, BlockHash, ChainExecutor, ConsensusContext, ContextError, ExecutionError,
        HostedBlockchain, NoopMetrics, Parameters, PublicKey, RelayPayload, StakeLedger, Validator,
    };
    use relaycraft_registry::{CacheConfig, HostedBlockchains, NodeRegistry, RegistryMode};
    use crate::ServiceConfig;

    struct Chain;

    impl ConsensusContext for Chain {
        fn current_height(&self) -> u64 {
            10
        }

        fn block_hash(&self, height: u64) -> std::result::Result<BlockHash, ContextError> {
            Ok([height as u8; 32])
        }
    }

    impl StakeLedger for Chain {
        fn validators_for_chain(&self, _height: u64, _chain: &str) -> Vec<Validator> {
            Vec::new()
        }

        fn validator(&self, _height: u64, _address: &Address) -> Option<Validator> {
            None
        }

        fn application(&self, _height: u64, _public_key: &PublicKey) -> Option<Application> {
            None
        }

        fn blocks_per_session(&self, _height: u64) -> u64 {
            4
        }

        fn session_node_count(&self, _height: u64) -> u64 {
            5
        }

        fn supported_blockchains(&self, _height: u64) -> Vec<String> {
            vec!["0001".to_string(), "0021".to_string()]
        }

        fn parameters(&self, _height: u64) -> Parameters {
            Parameters {
                session_node_count: 5,
                claim_submission_window: 3,
                supported_blockchains: self.supported_blockchains(0),
                claim_expiration: 24,
                minimum_number_of_proofs: 10,
            }
        }
    }

    #[async_trait]
    impl ChainExecutor for Chain {
        async fn execute(
            &self,
            _chain: &HostedBlockchain,
            _payload: &RelayPayload,
        ) -> std::result::Result<String, ExecutionError> {
            Err(ExecutionError::Timeout)
        }
    }

    fn querier(dir: &tempfile::TempDir) -> Querier {
        let chain = Arc::new(Chain);
        let service = RelayService::new(
            Arc::new(NodeRegistry::new(RegistryMode::default())),
            Arc::new(HostedBlockchains::default()),
            chain.clone(),
            chain.clone(),
            chain,
            Arc::new(NoopMetrics),
            ServiceConfig::new(CacheConfig::new(dir.path())),
        );
        Querier::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_supported_blockchains_route() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = querier(&dir).query(QUERY_SUPPORTED_BLOCKCHAINS, b"").await.unwrap();
        let chains: Vec<String> = serde_json::from_slice(&out).unwrap();
        assert_eq!(chains, vec!["0001", "0021"]);
    }

    #[tokio::test]
    async fn test_parameters_route() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = querier(&dir).query(QUERY_PARAMETERS, b"{}").await.unwrap();
        let params: Parameters = serde_json::from_slice(&out).unwrap();
        assert_eq!(params.claim_expiration, 24);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = querier(&dir).query("validators", b"{}").await.unwrap_err();
        assert!(matches!(err, RelayError::UnknownQuery(path) if path == "validators"));
    }

    #[tokio::test]
    async fn test_malformed_params() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = querier(&dir).query(QUERY_RECEIPTS, b"not json").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_receipts_for_unknown_servicer() {
        let dir = tempfile::TempDir::new().unwrap();
        let params = serde_json::to_vec(&QueryReceiptsParams {
            address: Address([3u8; 20]),
        })
        .unwrap();
        let err = querier(&dir).query(QUERY_RECEIPTS, &params).await.unwrap_err();
        assert!(matches!(err, RelayError::UnknownServicer(_)));
    }
}
