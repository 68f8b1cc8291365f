//! RelayCraft Relay
//!
//! Servicer side of the relay network:
//! 1. Validate a client relay against its session and the stake ledger
//! 2. Record the proof as evidence before doing the work
//! 3. Forward the payload to the hosted chain and sign the response
//!
//! Also handles client challenges, session dispatch and the JSON query
//! surface.

mod config;
mod error;
mod executor;
mod metrics;
mod querier;
mod service;

pub use config::ServiceConfig;
pub use error::{ErrorClass, RelayError, Result};
pub use executor::{HttpChainExecutor, DEFAULT_RPC_TIMEOUT_MS};
pub use metrics::{ChainMetrics, InMemoryMetrics};
pub use querier::{
    Querier, QueryDispatchParams, QueryReceiptParams, QueryReceiptsParams, QueryRelayParams,
    QUERY_DISPATCH, QUERY_PARAMETERS, QUERY_RECEIPT, QUERY_RECEIPTS, QUERY_RELAY,
    QUERY_SUPPORTED_BLOCKCHAINS,
};
pub use service::{RelayService, RelayState};
