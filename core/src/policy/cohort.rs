//! Cohort selection
//!
//! A cohort is the set of nodes a policy's key fragments are assigned to.
//! Threshold and share counts are checked before discovery is contacted.

use std::collections::BTreeSet;

use cbd_config::CohortConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boundary::{NodeDirectory, NodeQuery};
use crate::error::{CbdError, Result};
use crate::node::{NodeAddress, NodeInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    nodes: Vec<NodeInfo>,
    threshold: usize,
}

impl Cohort {
    /// Sample `config.shares` nodes from the directory
    pub async fn create(directory: &dyn NodeDirectory, config: &CohortConfig) -> Result<Self> {
        Self::create_with(directory, NodeQuery::sample(config.shares), config.threshold).await
    }

    /// Sample with explicit include/exclude lists
    pub async fn create_with(
        directory: &dyn NodeDirectory,
        query: NodeQuery,
        threshold: usize,
    ) -> Result<Self> {
        check_shape(threshold, query.quantity)?;
        if query.include.len() > query.quantity {
            return Err(CbdError::InvalidPolicyConfiguration(format!(
                "{} required nodes exceed {} shares",
                query.include.len(),
                query.quantity
            )));
        }

        let found = directory
            .get_nodes(&query)
            .await
            .map_err(|e| CbdError::DiscoveryUnavailable(e.to_string()))?;
        debug!("Directory returned {} nodes", found.len());

        let mut seen = BTreeSet::new();
        let nodes: Vec<NodeInfo> = found
            .into_iter()
            .filter(|node| !query.exclude.contains(&node.address))
            .filter(|node| seen.insert(node.address.clone()))
            .take(query.quantity)
            .collect();

        if nodes.len() < query.quantity {
            return Err(CbdError::InvalidPolicyConfiguration(format!(
                "only {} of {} requested nodes available",
                nodes.len(),
                query.quantity
            )));
        }
        if let Some(missing) = query.include.iter().find(|a| !seen.contains(*a)) {
            return Err(CbdError::InvalidPolicyConfiguration(format!(
                "required node {} not available",
                missing
            )));
        }

        info!(
            "Cohort selected: {} nodes, threshold {}",
            nodes.len(),
            threshold
        );
        Ok(Self { nodes, threshold })
    }

    /// Build from already-known nodes
    pub fn from_nodes(nodes: Vec<NodeInfo>, threshold: usize) -> Result<Self> {
        check_shape(threshold, nodes.len())?;
        let distinct: BTreeSet<_> = nodes.iter().map(|n| &n.address).collect();
        if distinct.len() != nodes.len() {
            return Err(CbdError::InvalidPolicyConfiguration(
                "duplicate node in cohort".into(),
            ));
        }
        Ok(Self { nodes, threshold })
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        self.nodes.iter().map(|n| n.address.clone()).collect()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn shares(&self) -> usize {
        self.nodes.len()
    }
}

fn check_shape(threshold: usize, shares: usize) -> Result<()> {
    if threshold == 0 || threshold > shares {
        return Err(CbdError::InvalidPolicyConfiguration(format!(
            "threshold {} must be between 1 and shares {}",
            threshold, shares
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalNetwork;

    #[tokio::test]
    async fn test_create_samples_shares() {
        let network = LocalNetwork::new(7);
        let config = CohortConfig {
            threshold: 3,
            shares: 5,
        };
        let cohort = Cohort::create(&network, &config).await.unwrap();
        assert_eq!(cohort.shares(), 5);
        assert_eq!(cohort.threshold(), 3);
    }

    #[tokio::test]
    async fn test_threshold_checked_before_discovery() {
        let network = LocalNetwork::new(5);
        let config = CohortConfig {
            threshold: 6,
            shares: 5,
        };
        let err = Cohort::create(&network, &config).await.unwrap_err();
        assert!(matches!(err, CbdError::InvalidPolicyConfiguration(_)));
        assert_eq!(network.discovery_calls(), 0);
    }

    #[tokio::test]
    async fn test_not_enough_nodes() {
        let network = LocalNetwork::new(2);
        let config = CohortConfig {
            threshold: 2,
            shares: 3,
        };
        let err = Cohort::create(&network, &config).await.unwrap_err();
        assert!(matches!(err, CbdError::InvalidPolicyConfiguration(_)));
    }

    #[tokio::test]
    async fn test_include_and_exclude() {
        let network = LocalNetwork::new(6);
        let all = network.node_addresses();

        let mut query = NodeQuery::sample(3);
        query.include.insert(all[5].clone());
        query.exclude.insert(all[0].clone());

        let cohort = Cohort::create_with(&network, query, 2).await.unwrap();
        let addresses = cohort.node_addresses();
        assert!(addresses.contains(&all[5]));
        assert!(!addresses.contains(&all[0]));
    }

    #[test]
    fn test_from_nodes_rejects_duplicates() {
        let network = LocalNetwork::new(2);
        let node = network.node_infos()[0].clone();
        let err = Cohort::from_nodes(vec![node.clone(), node], 1).unwrap_err();
        assert!(matches!(err, CbdError::InvalidPolicyConfiguration(_)));
    }
}
