//! Tag Reader — 16-byte page reads from a tag seated in a zone.
//!
//! Like the Lighting Controller, this module only builds the outgoing
//! frame and decodes the response payload; sending the frame and
//! correlating the reply through the Message Registry is the Session
//! Controller's job, the same split the reference daemon draws between
//! a driver's pure report encoding and `DeviceIo`'s actual I/O.

use crate::error::ToyPadError;
use crate::frame::build_command;
use crate::zone::Zone;

const OP_READ_PAGES: u8 = 0xD2;

/// Number of bytes returned per page read.
pub const PAGE_READ_LEN: usize = 16;

/// Build the frame for `read_pages(zone, start_page)`:
/// `55 04 D2 msg zone_wire start_page` plus checksum and padding.
pub fn build_read_request(zone: Zone, start_page: u8, msg: u8) -> [u8; 32] {
    let args = [zone.wire_byte(), start_page];
    build_command(OP_READ_PAGES, &args, msg).expect("read request args always fit")
}

/// Decode a read response payload (as delivered by the Message
/// Registry) into the 16 data bytes.
///
/// The payload is `[status, data_0, .., data_15]`. A non-zero status
/// means the device rejected the read (bad sector, auth required, tag
/// removed mid-read) and is surfaced as [`ToyPadError::DeviceError`]. A
/// payload shorter than 17 bytes is [`ToyPadError::Malformed`] — the
/// device is not supposed to truncate a successful read.
pub fn decode_read_response(payload: &[u8]) -> Result<[u8; PAGE_READ_LEN], ToyPadError> {
    if payload.len() < 1 + PAGE_READ_LEN {
        return Err(ToyPadError::Malformed);
    }

    let status = payload[0];
    if status != 0 {
        return Err(ToyPadError::DeviceError(status));
    }

    let mut data = [0u8; PAGE_READ_LEN];
    data.copy_from_slice(&payload[1..1 + PAGE_READ_LEN]);
    Ok(data)
}
