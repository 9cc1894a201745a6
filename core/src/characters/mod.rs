pub mod alice;
pub mod bob;
pub mod enrico;

pub use alice::Alice;
pub use bob::{Bob, RemoteBob};
pub use enrico::Enrico;
