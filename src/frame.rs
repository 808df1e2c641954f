//! Frame Codec — builds outgoing 32-byte command frames and parses
//! incoming 32-byte reports into either a tag event or a `0x55`
//! response.
//!
//! The device has been observed emitting responses under two
//! conflicting length conventions. Rather than gate on a firmware
//! version the daemon never gets to see, [`parse_response`] tries both
//! and keeps whichever validates by checksum — the same "speculate,
//! then validate" shape as `HidppReport::parse` in the reference
//! daemon's HID++ driver, generalized from a fixed report layout to
//! two candidate layouts.

use tracing::warn;

pub const REPORT_LEN: usize = 32;

const PREAMBLE_COMMAND: u8 = 0x55;
const PREAMBLE_TAG_EVENT: u8 = 0x56;
const TAG_EVENT_LEN_BYTE: u8 = 0x0B;

/// Maximum argument payload for an outgoing command
/// (`32 - header(4) - checksum(1) = 27`).
pub const MAX_ARGS_LEN: usize = 27;

/// A successfully parsed incoming report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// A `0x56` tag insertion/removal notification.
    TagEvent(RawTagEvent),
    /// A `0x55` response correlated to an outstanding request by `msg`.
    Response { msg: u8, payload: Vec<u8> },
    /// Recognised neither as a tag event nor a response.
    Unknown,
}

/// The raw fields of a tag event frame, before zone/UID validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTagEvent {
    pub zone: u8,
    pub index: u8,
    pub action: u8,
    pub uid: [u8; 7],
}

/// Build an outgoing command frame.
///
/// Returns `None` if `args.len() > MAX_ARGS_LEN` — the args plus header
/// and checksum would overflow the 32-byte report.
pub fn build_command(opcode: u8, args: &[u8], msg: u8) -> Option<[u8; REPORT_LEN]> {
    if args.len() > MAX_ARGS_LEN {
        return None;
    }

    let mut buf = [0u8; REPORT_LEN];
    let len = (args.len() + 3) as u8;
    buf[0] = PREAMBLE_COMMAND;
    buf[1] = len;
    buf[2] = opcode;
    buf[3] = msg;
    buf[4..4 + args.len()].copy_from_slice(args);

    let checksum_index = 4 + args.len();
    let checksum = checksum_of(&buf[..checksum_index]);
    buf[checksum_index] = checksum;

    Some(buf)
}

/// Sum of bytes `mod 256`, the checksum convention used throughout.
fn checksum_of(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Parse one 32-byte incoming report.
pub fn parse_input(buf: &[u8; REPORT_LEN]) -> ParsedFrame {
    if buf[0] == PREAMBLE_TAG_EVENT && buf[1] == TAG_EVENT_LEN_BYTE {
        let mut uid = [0u8; 7];
        uid.copy_from_slice(&buf[7..14]);
        return ParsedFrame::TagEvent(RawTagEvent {
            zone: buf[2],
            index: buf[4],
            action: buf[5],
            uid,
        });
    }

    if buf[0] == PREAMBLE_COMMAND {
        return parse_response(buf);
    }

    ParsedFrame::Unknown
}

/// Try Convention A, then Convention B, keeping whichever validates by
/// checksum. If neither validates, fall back to Convention A
/// best-effort (some firmwares emit wrong checksums but a correct
/// payload).
fn parse_response(buf: &[u8; REPORT_LEN]) -> ParsedFrame {
    let len = buf[1] as usize;
    let msg = buf[2];

    if let Some(payload) = try_convention_a(buf, len) {
        return ParsedFrame::Response { msg, payload };
    }
    if let Some(payload) = try_convention_b(buf, len) {
        return ParsedFrame::Response { msg, payload };
    }

    warn!(
        msg,
        len, "ChecksumMismatch: neither convention validated, falling back to best-effort decode"
    );

    /* Best-effort fallback: Convention A without checksum validation,
     * as long as the declared length fits in the report at all. */
    if len >= 1 && 3 + len - 1 <= REPORT_LEN {
        let payload_end = 3 + len - 1;
        let payload = buf[3..payload_end].to_vec();
        return ParsedFrame::Response { msg, payload };
    }

    ParsedFrame::Unknown
}

/// Convention A: `len` covers `payload + checksum`.
/// `payload = b[3..3+len-1]`, `cs = b[3+len-1]`.
fn try_convention_a(buf: &[u8; REPORT_LEN], len: usize) -> Option<Vec<u8>> {
    if len == 0 {
        return None;
    }
    let cs_index = 3 + len - 1;
    if cs_index >= REPORT_LEN {
        return None;
    }
    let expected = checksum_of(&buf[..cs_index]);
    if expected != buf[cs_index] {
        return None;
    }
    Some(buf[3..cs_index].to_vec())
}

/// Convention B: `len` covers `msg + payload + checksum`.
/// `payload = b[3..2+len-1]`, `cs = b[2+len-1]`.
fn try_convention_b(buf: &[u8; REPORT_LEN], len: usize) -> Option<Vec<u8>> {
    if len == 0 {
        return None;
    }
    let cs_index = 2 + len - 1;
    if cs_index >= REPORT_LEN || cs_index < 3 {
        return None;
    }
    let expected = checksum_of(&buf[..cs_index]);
    if expected != buf[cs_index] {
        return None;
    }
    Some(buf[3..cs_index].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_layout_and_checksum() {
        let buf = build_command(0xC0, &[0x02, 0x00, 0x00, 0x00, 0x00], 0x07).unwrap();
        assert_eq!(buf[0], 0x55);
        assert_eq!(buf[1], 0x08); // len = 3 + args.len() = 3 + 5
        assert_eq!(buf[2], 0xC0);
        assert_eq!(buf[3], 0x07);
        assert_eq!(&buf[4..9], &[0x02, 0x00, 0x00, 0x00, 0x00]);
        // Tail beyond checksum is zero.
        assert!(buf[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn scenario_d_set_color_all_off() {
        // `set_color(All, 0, 0, 0)` → `55 08 C0 00 02 00 00 00 00` + checksum 0x1F.
        let buf = build_command(0xC0, &[0x02, 0x00, 0x00, 0x00, 0x00], 0x00).unwrap();
        assert_eq!(&buf[0..9], &[0x55, 0x08, 0xC0, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(buf[9], 0x1F);
        assert!(buf[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn build_command_rejects_oversized_args() {
        let args = [0u8; MAX_ARGS_LEN + 1];
        assert!(build_command(0xC0, &args, 0x00).is_none());
    }

    #[test]
    fn build_command_accepts_max_args() {
        let args = [0xAAu8; MAX_ARGS_LEN];
        assert!(build_command(0xC0, &args, 0x00).is_some());
    }

    #[test]
    fn parse_tag_event_insert() {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x56;
        buf[1] = 0x0B;
        buf[2] = 0x02; // left
        buf[4] = 0x00; // index
        buf[5] = 0x00; // insert
        buf[7..14].copy_from_slice(&[0x04, 0x56, 0x00, 0x00, 0x00, 0x3A, 0x80]);

        match parse_input(&buf) {
            ParsedFrame::TagEvent(ev) => {
                assert_eq!(ev.zone, 2);
                assert_eq!(ev.action, 0);
                assert_eq!(ev.uid, [0x04, 0x56, 0x00, 0x00, 0x00, 0x3A, 0x80]);
            }
            other => panic!("expected TagEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_response_convention_a() {
        // Convention A: len covers payload+checksum.
        // payload = [0x00, 0x11, 0x22, 0x33]; msg=0x09; len = 4(payload)+1(cs) = 5
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x55;
        buf[2] = 0x09;
        let payload = [0x00u8, 0x11, 0x22, 0x33];
        buf[3..7].copy_from_slice(&payload);
        let len = 5u8;
        buf[1] = len;
        let cs_index = 3 + len as usize - 1; // = 7
        let cs = checksum_of(&buf[..cs_index]);
        buf[cs_index] = cs;

        match parse_input(&buf) {
            ParsedFrame::Response { msg, payload: p } => {
                assert_eq!(msg, 0x09);
                assert_eq!(p, payload.to_vec());
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parse_response_convention_b() {
        // Convention B: len covers msg+payload+checksum.
        // payload = [0xAA, 0xBB]; msg=0x05; len = 1(msg)+2(payload)+1(cs) = 4
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x55;
        buf[2] = 0x05;
        buf[3] = 0xAA;
        buf[4] = 0xBB;
        let len = 4u8;
        buf[1] = len;
        let cs_index = 2 + len as usize - 1; // = 5
        let cs = checksum_of(&buf[..cs_index]);
        buf[cs_index] = cs;

        match parse_input(&buf) {
            ParsedFrame::Response { msg, payload } => {
                assert_eq!(msg, 0x05);
                assert_eq!(payload, vec![0xAA, 0xBB]);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn convention_a_takes_priority_when_both_validate() {
        // A degenerate frame that happens to validate under both
        // conventions simultaneously. The parser must deterministically
        // prefer Convention A rather than returning either at random.
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = 0x55;
        buf[1] = 3; // len
        buf[4] = checksum_of(&buf[..4]); // Convention B checksum at index 4
        buf[5] = checksum_of(&buf[..5]); // Convention A checksum at index 5

        match parse_input(&buf) {
            ParsedFrame::Response { payload, .. } => {
                assert_eq!(payload, buf[3..5].to_vec(), "Convention A must win");
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn unknown_preamble() {
        let buf = [0u8; REPORT_LEN];
        assert_eq!(parse_input(&buf), ParsedFrame::Unknown);
    }
}
