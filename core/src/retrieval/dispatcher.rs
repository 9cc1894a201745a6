//! Work Order Dispatcher
//!
//! Solicits capsule fragments from the nodes a treasure map names until
//! the policy threshold is met.
//!
//! ```text
//!                 ┌──▶ node 1 ──(timeout)──┐
//!   candidates ───┼──▶ node 2 ──(timeout)──┼──▶ verify ──▶ RetrievalResult
//!  (map order)    └──▶ node k ──(timeout)──┘       │
//!        ▲                                         │ denial / timeout /
//!        └──────────── next candidate ◀────────────┘ bad signature / bad cfrag
//! ```
//!
//! Each node is bounded by its own timeout, so a slow node never holds up
//! faster ones. The whole call is bounded by an aggregate deadline. Only
//! the dispatch loop writes to the retrieval result. A fragment counts only
//! once it is shown to be a correct reencryption of the kit's capsule.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use cbd_conditions::ConditionContext;
use cbd_config::RetrievalConfig;
use futures::FutureExt;
use futures::future::try_join_all;
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::boundary::{BoundaryError, ReencryptionClient};
use crate::characters::bob::RemoteBob;
use crate::error::{CbdError, NodeFailure, QuorumBreakdown, Result};
use crate::kits::message_kit::MessageKit;
use crate::kits::retrieval::{PolicyMessageKit, RetrievalResult};
use crate::node::{NodeAddress, NodeInfo};
use crate::policy::treasure_map::TreasureMap;
use crate::retrieval::work_order::{NodeReply, WorkOrder, WorkOrderResult};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Bound on a single node's answer
    pub node_timeout: Duration,
    /// Bound on the whole retrieval call
    pub deadline: Duration,
    /// Nodes contacted up front; `None` contacts every assigned node
    pub initial_fanout: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for DispatcherConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            node_timeout: config.node_timeout(),
            deadline: config.deadline(),
            initial_fanout: config.initial_fanout,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

enum NodeOutcome {
    Fragment(WorkOrderResult),
    Failed(NodeFailure),
}

type Completion = (NodeAddress, NodeOutcome);

/// Tasks in flight for one kit, and the node each one is talking to
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<Completion>,
    nodes: HashMap<task::Id, NodeAddress>,
    outstanding: BTreeSet<NodeAddress>,
}

pub struct Dispatcher {
    client: Arc<dyn ReencryptionClient>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ReencryptionClient>, config: DispatcherConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Collect a quorum of verified fragments for every kit.
    ///
    /// `nodes` resolves treasure map destinations to reachable node
    /// records. Kits are retrieved concurrently under one shared deadline.
    pub async fn retrieve(
        &self,
        kits: Vec<MessageKit>,
        treasure_map: &TreasureMap,
        nodes: &[NodeInfo],
        bob: &RemoteBob,
        context: &ConditionContext,
    ) -> Result<Vec<PolicyMessageKit>> {
        let deadline = Instant::now() + self.config.deadline;
        let directory: BTreeMap<_, _> = nodes
            .iter()
            .map(|node| (node.address.clone(), node))
            .collect();

        info!(
            "Retrieving {} message kit(s) from {} assigned nodes (threshold {})",
            kits.len(),
            treasure_map.destinations.len(),
            treasure_map.threshold
        );

        try_join_all(kits.into_iter().map(|kit| {
            self.retrieve_kit(kit, treasure_map, &directory, bob, context, deadline)
        }))
        .await
    }

    async fn retrieve_kit(
        &self,
        kit: MessageKit,
        treasure_map: &TreasureMap,
        directory: &BTreeMap<NodeAddress, &NodeInfo>,
        bob: &RemoteBob,
        context: &ConditionContext,
        deadline: Instant,
    ) -> Result<PolicyMessageKit> {
        let threshold = treasure_map.threshold;
        let mut breakdown = QuorumBreakdown::default();
        let mut result = RetrievalResult::new();

        let mut candidates = VecDeque::new();
        for address in treasure_map.node_addresses() {
            match directory.get(address) {
                Some(node) => candidates.push_back(WorkOrder::new(
                    (*node).clone(),
                    treasure_map,
                    &kit,
                    bob,
                    context,
                )?),
                None => breakdown.record(
                    address.clone(),
                    NodeFailure::Unreachable("unknown to discovery".into()),
                ),
            }
        }

        let fanout = self
            .config
            .initial_fanout
            .unwrap_or(candidates.len())
            .max(threshold);

        let mut in_flight = InFlight::default();
        for order in candidates.drain(..fanout.min(candidates.len())) {
            self.spawn(&mut in_flight, order);
        }
        debug!("Dispatched {} work orders", in_flight.outstanding.len());

        while result.len() < threshold {
            let joined = match timeout_at(deadline, in_flight.tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Retrieval deadline hit with {} of {} fragments",
                        result.len(),
                        threshold
                    );
                    for address in std::mem::take(&mut in_flight.outstanding) {
                        breakdown.record(address, NodeFailure::DeadlineExceeded);
                    }
                    break;
                }
            };

            let (address, outcome) = match joined {
                Ok(completion) => completion,
                Err(e) => {
                    let Some(address) = in_flight.nodes.get(&e.id()).cloned() else {
                        warn!("Work order task failed: {}", e);
                        continue;
                    };
                    warn!("Work order task for {} failed: {}", address, e);
                    let failure = NodeFailure::Unreachable(format!("task failed: {}", e));
                    (address, NodeOutcome::Failed(failure))
                }
            };
            in_flight.outstanding.remove(&address);

            match outcome {
                NodeOutcome::Fragment(verified) => {
                    debug!("Fragment accepted from {}", address);
                    result.add(address, verified.cfrag);
                }
                NodeOutcome::Failed(failure) => {
                    match &failure {
                        NodeFailure::InvalidSignature | NodeFailure::InvalidFragment(_) => {
                            warn!("Discarding fragment from {}: {}", address, failure);
                        }
                        _ => debug!("No fragment from {}: {}", address, failure),
                    }
                    breakdown.record(address, failure);

                    if let Some(order) = candidates.pop_front() {
                        self.spawn(&mut in_flight, order);
                    }
                }
            }
        }
        in_flight.tasks.abort_all();

        for address in in_flight.outstanding {
            breakdown
                .failures
                .entry(address)
                .or_insert(NodeFailure::Unreachable("task aborted".into()));
        }

        if result.len() < threshold {
            warn!(
                "Quorum missed: {} of {} fragments ({})",
                result.len(),
                threshold,
                breakdown
            );
            return Err(CbdError::InsufficientFragments {
                threshold,
                received: result.len(),
                breakdown,
            });
        }

        info!("Quorum reached: {} of {} fragments", result.len(), threshold);
        Ok(
            PolicyMessageKit::from_message_kit(kit, treasure_map.policy_encrypting_key, threshold)
                .with_result(result),
        )
    }

    /// A panic inside the client still yields the node's address, so the
    /// node is recorded and replaced like any other failure.
    fn spawn(&self, in_flight: &mut InFlight, order: WorkOrder) {
        let client = Arc::clone(&self.client);
        let node_timeout = self.config.node_timeout;
        let address = order.node.address.clone();
        in_flight.outstanding.insert(address.clone());

        let handle = in_flight.tasks.spawn(async move {
            let outcome = AssertUnwindSafe(execute(client.as_ref(), &order, node_timeout))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    let failure = NodeFailure::Unreachable("work order task panicked".into());
                    NodeOutcome::Failed(failure)
                });
            (order.node.address, outcome)
        });
        in_flight.nodes.insert(handle.id(), address);
    }
}

async fn execute(
    client: &dyn ReencryptionClient,
    order: &WorkOrder,
    node_timeout: Duration,
) -> NodeOutcome {
    let reply = match timeout(node_timeout, client.reencrypt(&order.node, &order.request)).await {
        Err(_) | Ok(Err(BoundaryError::Timeout)) => {
            return NodeOutcome::Failed(NodeFailure::TimedOut);
        }
        Ok(Err(e)) => return NodeOutcome::Failed(NodeFailure::Unreachable(e.to_string())),
        Ok(Ok(reply)) => reply,
    };

    match reply {
        NodeReply::Denied(reason) => NodeOutcome::Failed(NodeFailure::from(reason)),
        NodeReply::Fragment { cfrag, signature } => {
            match WorkOrderResult::verify(order, &cfrag, &signature) {
                Ok(verified) => NodeOutcome::Fragment(verified),
                Err(failure) => NodeOutcome::Failed(failure),
            }
        }
    }
}
