pub mod message_kit;
pub mod retrieval;

pub use message_kit::MessageKit;
pub use retrieval::{KitState, PolicyMessageKit, RetrievalResult};
