//! CBD Core
//!
//! Condition-based decryption client engine: policy creation over a
//! threshold cohort, treasure map publication and resolution, work order
//! dispatch and threshold decryption.
//!
//! ```text
//!  Alice ── grant ──▶ Cohort ─▶ BlockchainPolicy ─▶ PolicyLedger
//!                                     │ PublishedTreasureMap
//!  Enrico ── encrypt ──▶ MessageKit   ▼
//!                          │        Bob ── resolve ──▶ TreasureMap
//!                          ▼                              │
//!                     Dispatcher ◀────── WorkOrders ──────┘
//!                          │  ≥ m verified CapsuleFrags
//!                          ▼
//!                     Decryptor ──▶ plaintext
//! ```
//!
//! Every external collaborator sits behind a trait in [`boundary`].
//! [`porter`] talks to a Porter service over HTTP; [`local`] runs the
//! whole network in process.

pub mod boundary;
pub mod characters;
mod codec;
pub mod error;
pub mod keyring;
pub mod kits;
pub mod local;
pub mod node;
pub mod policy;
pub mod porter;
pub mod retrieval;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use boundary::{
    BoundaryError, NodeDirectory, NodeQuery, PolicyLedger, PolicyMetadata, ReencryptionClient,
    TransactionReceipt,
};
pub use characters::{Alice, Bob, Enrico, RemoteBob};
pub use error::{CbdError, ErrorKind, NodeFailure, QuorumBreakdown, Result};
pub use keyring::Keyring;
pub use kits::{KitState, MessageKit, PolicyMessageKit, RetrievalResult};
pub use node::{NodeAddress, NodeInfo};
pub use policy::{BlockchainPolicy, Cohort, EnactedPolicy, Hrac, PublishedTreasureMap, TreasureMap};
pub use porter::{PorterClient, PorterClientConfig};
pub use retrieval::{Decryptor, Dispatcher, DispatcherConfig, WorkOrder, WorkOrderResult};
pub use strategy::{Decrypter, DeployedStrategy, Network, Strategy};

// Re-exported so callers don't have to version-match the PRE adapter.
pub use cbd_pre;
