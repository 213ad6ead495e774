//! On-wire framing: the datagram envelope and the message bodies the
//! session core itself understands.

pub mod packet;
pub mod rel;
pub mod sess;

pub use packet::PMessage;
pub use rel::RMessage;
