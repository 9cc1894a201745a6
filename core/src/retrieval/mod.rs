pub mod decryptor;
pub mod dispatcher;
pub mod work_order;

pub use decryptor::Decryptor;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use work_order::{
    DenialReason, NodeReply, ReencryptionNode, ReencryptionRequest, WorkOrder, WorkOrderResult,
};
