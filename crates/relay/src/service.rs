//! Relay, challenge and dispatch handling
//!
//! Relay lifecycle:
//! `Received -> Validated -> ProofRecorded -> Executed -> Signed -> Responded`,
//! with `Rejected` reachable from `Received` and `Validated`. The proof is
//! recorded before execution, so a failed hosted-chain call still leaves
//! the work claimed.

use std::sync::Arc;
use std::time::Instant;

use relaycraft_core::{
    Address, ChainExecutor, ChallengeProofInvalidData, ChallengeResponse, ConsensusContext,
    DispatchResponse, DispatchSession, EvidenceType, HostedBlockchain, Parameters, Proof, Receipt,
    Relay, RelayResponse, ServiceMetrics, Session, SessionHeader, StakeLedger,
};
use relaycraft_registry::{HostedBlockchains, NodeCaches, NodeRegistry, ServicerNode};
use relaycraft_session::{is_session_block, is_within_tolerance, latest_session_block_height, SessionDeriver};
use tracing::{debug, error, info, warn};

use crate::{RelayError, Result, ServiceConfig};

/// Stage of a relay inside [`RelayService::handle_relay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Received,
    Validated,
    ProofRecorded,
    Executed,
    Signed,
    Responded,
    Rejected,
}

impl RelayState {
    fn advance(self, next: RelayState, chain: &str) -> RelayState {
        debug!("Relay on chain {}: {:?} -> {:?}", chain, self, next);
        next
    }
}

/// Heights the current request is judged against
struct SessionClock {
    current: u64,
    blocks_per_session: u64,
    latest_session: u64,
}

/// A relay that passed validation
struct ValidatedRelay {
    header: SessionHeader,
    chain: HostedBlockchain,
    max_possible_relays: u64,
}

/// Servicer-side protocol handler
pub struct RelayService {
    registry: Arc<NodeRegistry>,
    hosted: Arc<HostedBlockchains>,
    ledger: Arc<dyn StakeLedger>,
    consensus: Arc<dyn ConsensusContext>,
    executor: Arc<dyn ChainExecutor>,
    metrics: Arc<dyn ServiceMetrics>,
    config: ServiceConfig,
}

impl RelayService {
    pub fn new(
        registry: Arc<NodeRegistry>,
        hosted: Arc<HostedBlockchains>,
        ledger: Arc<dyn StakeLedger>,
        consensus: Arc<dyn ConsensusContext>,
        executor: Arc<dyn ChainExecutor>,
        metrics: Arc<dyn ServiceMetrics>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            registry,
            hosted,
            ledger,
            consensus,
            executor,
            metrics,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn hosted_blockchains(&self) -> &Arc<HostedBlockchains> {
        &self.hosted
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn clock(&self) -> SessionClock {
        let current = self.consensus.current_height();
        let blocks_per_session = self.ledger.blocks_per_session(current);
        SessionClock {
            current,
            blocks_per_session,
            latest_session: latest_session_block_height(current, blocks_per_session),
        }
    }

    fn deriver(&self) -> SessionDeriver<'_> {
        SessionDeriver::new(self.consensus.as_ref(), self.ledger.as_ref())
    }

    /// Stores of `node`, opening them on first use
    fn caches_for(&self, node: &ServicerNode) -> Result<NodeCaches> {
        if let Some(caches) = node.caches() {
            return Ok(caches.clone());
        }
        self.registry
            .init_caches(node, &self.config.cache)?
            .ok_or(RelayError::NoStores(node.address()))
    }

    /// Identity a relay is addressed to
    fn identity_for(&self, relay: &Relay) -> Result<Arc<ServicerNode>> {
        if self.registry.is_lean() {
            let address = relay.proof.servicer_address();
            return Ok(self.registry.resolve(&address)?);
        }
        Ok(self.registry.any()?)
    }

    /// Serve a relay for one of this node's identities
    pub async fn handle_relay(&self, relay: Relay) -> Result<RelayResponse> {
        let started = Instant::now();
        let chain_id = relay.proof.chain.clone();
        let mut state = RelayState::Received;
        let clock = self.clock();

        let node = self.identity_for(&relay)?;
        let caches = self.caches_for(&node)?;

        let validated = match self.validate_relay(&relay, &node, &caches, &clock) {
            Ok(validated) => validated,
            Err(e) => {
                state.advance(RelayState::Rejected, &chain_id);
                self.log_rejection(&relay, &node, &clock, &e);
                return Err(e);
            }
        };
        state = state.advance(RelayState::Validated, &chain_id);

        // Write-ahead: the proof is claimable even if execution fails
        if let Err(e) = caches.evidence.set_proof(
            &validated.header,
            EvidenceType::Relay,
            Proof::Relay(relay.proof.clone()),
            validated.max_possible_relays,
        ) {
            let e = RelayError::from(e);
            state.advance(RelayState::Rejected, &chain_id);
            self.log_rejection(&relay, &node, &clock, &e);
            return Err(e);
        }
        state = state.advance(RelayState::ProofRecorded, &chain_id);

        let response = self
            .executor
            .execute(&validated.chain, &relay.payload)
            .await
            .map_err(|e| {
                error!("Could not send relay to chain {}: {}", chain_id, e);
                RelayError::ExecutionFailed(e)
            })?;
        state = state.advance(RelayState::Executed, &chain_id);

        let mut relay_response = RelayResponse {
            signature: [0u8; 64],
            response,
            proof: relay.proof,
        };
        relay_response.signature = node.sign(&relay_response.hash());
        state = state.advance(RelayState::Signed, &chain_id);

        let address = node.address();
        let millis = started.elapsed().as_millis() as f64;
        self.metrics.add_relay_timing_for(&chain_id, millis, &address);
        self.metrics.add_relay_for(&chain_id, &address);
        state.advance(RelayState::Responded, &chain_id);

        Ok(relay_response)
    }

    fn validate_relay(
        &self,
        relay: &Relay,
        node: &ServicerNode,
        caches: &NodeCaches,
        clock: &SessionClock,
    ) -> Result<ValidatedRelay> {
        relay.validate_request_hash()?;

        let proof = &relay.proof;
        let header = proof.session_header();
        header.validate()?;
        if !is_session_block(header.session_block_height, clock.blocks_per_session) {
            return Err(RelayError::InvalidBlockHeight(header.session_block_height));
        }
        if !is_within_tolerance(
            header.session_block_height,
            clock.latest_session,
            self.config.client_session_sync_allowance,
            clock.blocks_per_session,
        ) {
            return Err(RelayError::SessionHeightOutOfTolerance {
                height: header.session_block_height,
                latest: clock.latest_session,
            });
        }

        proof.validate_signatures()?;
        if proof.servicer_public_key != node.public_key() {
            return Err(RelayError::ServicerKeyMismatch);
        }

        let chain = self
            .hosted
            .get(&proof.chain)
            .ok_or_else(|| RelayError::UnsupportedChain(proof.chain.clone()))?;

        let app = self
            .ledger
            .application(header.session_block_height, &header.application_public_key)
            .ok_or(RelayError::AppNotFound)?;
        if app.jailed {
            return Err(RelayError::AppJailed);
        }
        if !app.supports_chain(&header.chain) {
            return Err(RelayError::AppChainNotStaked(header.chain.clone()));
        }

        let session = self.deriver().derive_or_fetch(&caches.sessions, &header)?;
        if !session.contains(&node.address()) {
            return Err(RelayError::NotInSession(node.address()));
        }

        let max_possible_relays = max_possible_relays(app.max_relays, &session);
        let evidence = caches
            .evidence
            .get_evidence(&header, EvidenceType::Relay, max_possible_relays)?;
        let proof = Proof::Relay(proof.clone());
        if !evidence.is_unique(&proof) {
            return Err(RelayError::DuplicateProof(proof.entropy()));
        }
        if evidence.count >= max_possible_relays {
            return Err(RelayError::EvidenceCapExceeded(max_possible_relays));
        }

        Ok(ValidatedRelay {
            header,
            chain,
            max_possible_relays,
        })
    }

    fn log_rejection(&self, relay: &Relay, node: &ServicerNode, clock: &SessionClock, err: &RelayError) {
        if !self.config.relay_errors {
            return;
        }
        let app = hex::encode(relay.proof.token.application_public_key);
        error!(
            "Could not validate relay for app {} on chain {}: {}",
            app, relay.proof.chain, err
        );
        debug!(
            "Could not validate relay for app {} on chain {} on node {} at session height {}: {}",
            app,
            relay.proof.chain,
            node.address(),
            clock.latest_session,
            err
        );
    }

    /// Record a client's claim that a servicer returned divergent data.
    ///
    /// Challenges are handled by the identity with the lowest address
    /// (`NodeRegistry::any`); it must be in the challenged session and is
    /// the reporter the challenge has to name. Other local identities
    /// never receive challenge evidence.
    pub fn handle_challenge(&self, challenge: ChallengeProofInvalidData) -> Result<ChallengeResponse> {
        let node = self.registry.any()?;
        let caches = self.caches_for(&node)?;
        let clock = self.clock();
        let session_height = clock.latest_session;

        let minority_proof = &challenge.minority_response.proof;
        let app = self
            .ledger
            .application(session_height, &minority_proof.token.application_public_key)
            .ok_or(RelayError::AppNotFound)?;

        let header = SessionHeader::new(
            minority_proof.token.application_public_key,
            minority_proof.chain.clone(),
            session_height,
        );
        header.validate()?;
        let session = self.deriver().derive_or_fetch(&caches.sessions, &header)?;

        validate_challenge(&challenge, &header, &session, &app.chains, &node.address())?;

        let servicer = hex::encode(minority_proof.servicer_public_key);
        caches.evidence.set_proof(
            &header,
            EvidenceType::Challenge,
            Proof::Challenge(challenge),
            app.max_relays,
        )?;
        self.metrics.add_challenge_for(&header.chain, &node.address());
        info!("Stored challenge proof for servicer {} on chain {}", servicer, header.chain);

        Ok(ChallengeResponse {
            response: format!("successfully stored challenge proof for {}", servicer),
        })
    }

    /// Session for a client, at the latest session height unless the client
    /// names a height within the sync allowance
    pub fn dispatch(&self, mut header: SessionHeader) -> Result<DispatchResponse> {
        let clock = self.clock();
        let allowance = self.config.client_session_sync_allowance;
        if allowance > 0 && header.session_block_height != 0 {
            if !is_session_block(header.session_block_height, clock.blocks_per_session) {
                return Err(RelayError::InvalidBlockHeight(header.session_block_height));
            }
            if !is_within_tolerance(
                header.session_block_height,
                clock.latest_session,
                allowance,
                clock.blocks_per_session,
            ) {
                return Err(RelayError::SessionHeightOutOfTolerance {
                    height: header.session_block_height,
                    latest: clock.latest_session,
                });
            }
        } else {
            header.session_block_height = clock.latest_session;
        }
        header.validate()?;

        let node = self.registry.any()?;
        let caches = self.caches_for(&node)?;
        let session = self.deriver().derive_or_fetch(&caches.sessions, &header)?;

        let height = session.header.session_block_height;
        let session_nodes = session
            .session_nodes
            .iter()
            .filter_map(|address| {
                let validator = self.ledger.validator(height, address);
                if validator.is_none() {
                    warn!("Session node {} not found in ledger at height {}", address, height);
                }
                validator
            })
            .collect();

        Ok(DispatchResponse {
            session: DispatchSession {
                header: session.header,
                session_key: session.session_key,
                session_nodes,
            },
            block_height: clock.current,
        })
    }

    pub fn supported_blockchains(&self) -> Vec<String> {
        self.ledger.supported_blockchains(self.consensus.current_height())
    }

    pub fn parameters(&self) -> Parameters {
        self.ledger.parameters(self.consensus.current_height())
    }

    /// Recorded evidence for (servicer, header, kind), if any
    pub fn receipt(&self, address: &Address, header: &SessionHeader, kind: EvidenceType) -> Result<Option<Receipt>> {
        let node = self.registry.resolve(address)?;
        let caches = self.caches_for(&node)?;
        let evidence = caches.evidence.get_evidence(header, kind, 0)?;
        if evidence.is_empty() {
            return Ok(None);
        }
        Ok(Some(Receipt {
            header: evidence.header,
            servicer_address: *address,
            evidence_type: evidence.evidence_type,
            total: evidence.count,
        }))
    }

    /// Every recorded evidence bucket of a servicer
    pub fn receipts(&self, address: &Address) -> Result<Vec<Receipt>> {
        let node = self.registry.resolve(address)?;
        let caches = self.caches_for(&node)?;
        Ok(caches
            .evidence
            .all_evidence()?
            .into_iter()
            .map(|evidence| Receipt {
                header: evidence.header,
                servicer_address: *address,
                evidence_type: evidence.evidence_type,
                total: evidence.count,
            })
            .collect())
    }

    /// Drop every identity's cached sessions
    pub fn clear_session_cache(&self) {
        self.registry.clear_session_caches();
    }
}

/// Per-servicer share of the application's relay allowance, rounded up
fn max_possible_relays(max_relays: u64, session: &Session) -> u64 {
    let nodes = session.session_nodes.len().max(1) as u64;
    max_relays.div_ceil(nodes)
}

fn validate_challenge(
    challenge: &ChallengeProofInvalidData,
    header: &SessionHeader,
    session: &Session,
    app_chains: &[String],
    self_address: &Address,
) -> Result<()> {
    let invalid = |reason: &str| Err(RelayError::InvalidChallenge(reason.to_string()));

    if challenge.majority_responses.len() < 2 {
        return invalid("at least two majority responses are required");
    }
    if challenge.reporter_address != *self_address {
        return invalid("reporter is not this node");
    }
    if !app_chains.iter().any(|c| c == &header.chain) {
        return Err(RelayError::AppChainNotStaked(header.chain.clone()));
    }

    let minority = &challenge.minority_response;
    let request_hash = minority.proof.request_hash;
    let majority_body = &challenge.majority_responses[0].response;
    let mut servicers = Vec::with_capacity(challenge.majority_responses.len() + 1);

    for response in challenge
        .majority_responses
        .iter()
        .chain(std::iter::once(minority))
    {
        let proof = &response.proof;
        if proof.request_hash != request_hash {
            return invalid("responses are for different requests");
        }
        if &proof.session_header() != header {
            return invalid("response is not for the current session");
        }
        proof.validate_signatures()?;
        if !response.verify_signature() {
            return invalid("servicer signature does not verify");
        }
        let servicer = proof.servicer_address();
        if servicers.contains(&servicer) {
            return invalid("duplicate servicer in challenge");
        }
        if !session.contains(&servicer) {
            return Err(RelayError::NotInSession(servicer));
        }
        servicers.push(servicer);
    }

    if challenge
        .majority_responses
        .iter()
        .any(|r| &r.response != majority_body)
    {
        return invalid("majority responses disagree");
    }
    if &minority.response == majority_body {
        return invalid("minority response matches the majority");
    }
    Ok(())
}
