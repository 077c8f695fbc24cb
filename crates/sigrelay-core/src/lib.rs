pub mod envelope;
pub mod errors;
pub mod ids;
pub mod role;

pub use envelope::{Inbound, Outbound};
pub use errors::RelayError;
pub use ids::{ConnectionId, ConnectionKey};
pub use role::Role;
