//! The SESS handshake bodies.

use crate::consts;
use bytes::Bytes;
use hearthen_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

/// The connect request sent to the login endpoint.
#[derive(Debug, Clone)]
pub struct SessRequest {
    pub username: String,
    pub cookie: Bytes,
    /// Pre-encoded argument list, appended opaquely.
    pub args: Bytes,
}

impl Writable for SessRequest {
    /// Writes the full SESS payload: version tag, server identifier,
    /// client protocol version, user name, cookie and argument list.
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        if self.cookie.len() > u16::MAX as usize {
            return Err(BinaryError::InvalidData(format!(
                "Cookie too large: {} bytes",
                self.cookie.len()
            )));
        }
        writer.write_u16(consts::VERSION_TAG)?;
        writer.write_string(consts::SERVER_ID)?;
        writer.write_u16(consts::PVER)?;
        writer.write_string(&self.username)?;
        writer.write_u16(self.cookie.len() as u16)?;
        writer.write_bytes(&self.cookie)?;
        writer.write_bytes(&self.args)?;
        Ok(())
    }
}

/// A SESS reply: an error code, zero meaning success. `SESSERR_MESG`
/// carries an explanation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessReply {
    pub code: u8,
    pub detail: Option<String>,
}

impl Readable for SessReply {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let code = reader.read_u8()?;
        let detail = if code == consts::SESSERR_MESG {
            // Tolerate a missing explanation.
            reader.read_string().ok()
        } else {
            None
        };
        Ok(SessReply { code, detail })
    }
}

impl SessReply {
    pub fn ok(&self) -> bool {
        self.code == 0
    }
}
