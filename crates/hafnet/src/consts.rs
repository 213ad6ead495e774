//! Wire-level constants shared between client and server.

/// Session control: connect request, or a one-byte reply code.
pub const SESS: u8 = 0;
/// Reliable stream data.
pub const REL: u8 = 1;
/// Reliable stream acknowledgement.
pub const ACK: u8 = 2;
/// Heartbeat, empty payload.
pub const BEAT: u8 = 3;
/// Map tile request.
pub const MAPREQ: u8 = 4;
/// Map tile data.
pub const MAPDATA: u8 = 5;
/// Object state deltas.
pub const OBJDATA: u8 = 6;
/// Per-object frame acknowledgements.
pub const OBJACK: u8 = 7;
/// Close handshake, empty payload.
pub const CLOSE: u8 = 8;

/// SESS reply codes; zero means the session was accepted.
pub const SESSERR_AUTH: u8 = 1;
pub const SESSERR_BUSY: u8 = 2;
pub const SESSERR_CONN: u8 = 3;
pub const SESSERR_PVER: u8 = 4;
pub const SESSERR_EXPR: u8 = 5;
pub const SESSERR_MESG: u8 = 6;

/// Protocol version tag leading every connect request.
pub const VERSION_TAG: u16 = 2;
/// Server identifier string expected by the login endpoint.
pub const SERVER_ID: &str = "Hafen";
/// Client protocol version, bumped in lockstep with the server.
pub const PVER: u16 = 4;

/// Upper bound on an encoded datagram, tag byte included.
pub const MAX_PACKET_SIZE: usize = 65536;
