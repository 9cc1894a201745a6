//! Local end-to-end run
//!
//! Spins up an in-process network, grants a policy gated on NFT ownership,
//! encrypts a message and retrieves it back through the cohort.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cbd_conditions::{Condition, ConditionContext, ConditionSet, Param};
use cbd_config::{CbdConfig, CohortConfig};
use cbd_core::local::{InMemoryLedger, LocalNetwork, NodeBehaviour, StaticOracle};
use cbd_core::{Cohort, Keyring, Network, Strategy};
use clap::Args;
use tracing::info;

use crate::keys;

const DEMO_NFT: &str = "0x1e988ba4692e52bc50b375bcc8585b95c48aad77";
const DEMO_USER: &str = "0x7fff551249d223f723557a96a0e1a469c79cc934";

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Overrides cohort.threshold
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Overrides cohort.shares
    #[arg(long)]
    pub shares: Option<usize>,

    /// Size of the local network (default: shares)
    #[arg(long)]
    pub nodes: Option<usize>,

    #[arg(long, default_value = "this is a secret")]
    pub message: String,

    /// Token the reader must own
    #[arg(long, default_value = "5954")]
    pub token_id: u64,

    /// Number of cohort nodes to take offline
    #[arg(long, default_value = "0")]
    pub unreachable: usize,

    /// Read as someone who does not own the token
    #[arg(long)]
    pub as_stranger: bool,

    /// Publisher seed file (default: random)
    #[arg(long)]
    pub publisher_key: Option<PathBuf>,

    /// Recipient seed file (default: random)
    #[arg(long)]
    pub recipient_key: Option<PathBuf>,
}

pub async fn run(config: &CbdConfig, args: DemoArgs) -> Result<()> {
    let cohort_config = CohortConfig {
        threshold: args.threshold.unwrap_or(config.cohort.threshold),
        shares: args.shares.unwrap_or(config.cohort.shares),
    };
    let chain = config.conditions.default_chain_id;

    let oracle = Arc::new(StaticOracle::new());
    oracle.set(DEMO_NFT, "ownerOf", Param::from(DEMO_USER));
    let local = Arc::new(LocalNetwork::with_oracle(
        args.nodes.unwrap_or(cohort_config.shares),
        oracle.clone(),
    ));
    let network = Network {
        directory: local.clone(),
        client: local.clone(),
        ledger: Arc::new(InMemoryLedger::default()),
        oracle: Some(oracle),
    };

    let cohort = Cohort::create(local.as_ref(), &cohort_config).await?;
    for address in cohort.node_addresses().iter().take(args.unreachable) {
        local.set_behaviour(address, NodeBehaviour::Unreachable).await;
        info!("Node {} taken offline", address);
    }

    let conditions =
        ConditionSet::from(Condition::erc721_ownership(DEMO_NFT, chain, args.token_id));
    let mut strategy = Strategy::create(cohort, Some(conditions))?;
    if args.publisher_key.is_some() || args.recipient_key.is_some() {
        strategy = strategy.with_keyrings(
            load_or_random(args.publisher_key.as_deref())?,
            load_or_random(args.recipient_key.as_deref())?,
        );
    }

    let deployed = strategy
        .deploy("cbd-demo", &network, &config.retrieval)
        .await
        .context("deploying policy")?;
    println!(
        "Policy {} granted ({}-of-{}), tx {}",
        deployed.policy.hrac,
        deployed.policy.threshold,
        deployed.policy.shares,
        deployed.policy.treasure_map.receipt().tx_hash
    );

    let kit = deployed.encrypter.encrypt_message(args.message.as_bytes(), None)?;
    let reader = if args.as_stranger {
        "0x0000000000000000000000000000000000000bad"
    } else {
        DEMO_USER
    };

    let cleartexts = deployed
        .decrypter
        .retrieve_and_decrypt(vec![kit], &ConditionContext::for_user(reader))
        .await
        .with_context(|| format!("retrieving as {}", reader))?;

    for cleartext in cleartexts {
        println!("Decrypted: {}", String::from_utf8_lossy(&cleartext));
    }
    println!("Work orders sent: {}", local.dispatched());
    Ok(())
}

fn load_or_random(path: Option<&std::path::Path>) -> Result<Keyring> {
    match path {
        Some(path) => keys::read_seed(path),
        None => Ok(Keyring::random()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DemoArgs {
        DemoArgs {
            threshold: Some(2),
            shares: Some(3),
            nodes: None,
            message: "hello".into(),
            token_id: 5954,
            unreachable: 0,
            as_stranger: false,
            publisher_key: None,
            recipient_key: None,
        }
    }

    #[tokio::test]
    async fn test_demo_succeeds_for_owner() {
        assert!(run(&CbdConfig::default(), args()).await.is_ok());
    }

    #[tokio::test]
    async fn test_demo_survives_one_offline_node() {
        let demo = DemoArgs {
            unreachable: 1,
            ..args()
        };
        assert!(run(&CbdConfig::default(), demo).await.is_ok());
    }

    #[tokio::test]
    async fn test_demo_denies_stranger() {
        let demo = DemoArgs {
            as_stranger: true,
            ..args()
        };
        assert!(run(&CbdConfig::default(), demo).await.is_err());
    }
}
