pub mod builder;
pub mod cohort;
pub mod hrac;
pub mod treasure_map;

pub use builder::{BlockchainPolicy, EnactedPolicy};
pub use cohort::Cohort;
pub use hrac::Hrac;
pub use treasure_map::{
    AuthorizedKeyFrag, EncryptedKeyFrag, EncryptedTreasureMap, PrePublishedTreasureMap,
    PublishedTreasureMap, TreasureMap,
};
