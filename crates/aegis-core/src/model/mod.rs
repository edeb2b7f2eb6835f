//! Wire and domain types: [`ServiceInstance`], the message envelope family
//! (`RpcRequest`/`RpcResponse`/`Event`/`Command`), and the election record.
//! See spec §3 and §6.2-6.3 for the canonical field layouts.

mod election;
mod envelope;
pub(crate) mod instance;

pub use election::ElectionRecord;
pub use envelope::{Command, CommandProgress, CommandResult, Envelope, Event, Priority, RpcRequest, RpcResponse};
pub use instance::{ServiceInstance, ServiceStatus, StickyActiveStatus};
