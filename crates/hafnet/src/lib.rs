//! Client-side session engine for the Hafen game protocol: an
//! authenticated session over UDP carrying two ordered reliable message
//! streams, unreliable bulk map/object data with per-object frame
//! acknowledgements, and an orderly close handshake. One worker task owns
//! the socket and all reliability state; applications talk to it through
//! [`Connection`] and receive traffic through a [`MessageHandler`].

pub mod consts;
pub mod error;
pub mod objack;
pub mod protocol;
pub mod reliability;
pub mod seq;
pub mod session;

pub use error::SessionError;
pub use protocol::{PMessage, RMessage};
pub use session::{Connection, MessageHandler};
