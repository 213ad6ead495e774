//! The two reliable stream directions.

pub mod receive_queue;
pub mod send_queue;

pub use receive_queue::ReceiveQueue;
pub use send_queue::SendQueue;
