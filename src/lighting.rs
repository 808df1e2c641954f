//! Lighting Controller — solid color, fade, and flash, single-zone or
//! broadcast across all three physical zones.
//!
//! All lighting sends are fire-and-forget: the protocol does not
//! require a response, so these functions never register a registry
//! waiter. If the device emits a stray `0x55` ack anyway, the Message
//! Registry drops it silently (no pending entry for that `msg`).

use crate::frame::{build_command, MAX_ARGS_LEN};
use crate::zone::Zone;

const OP_SOLID: u8 = 0xC0;
const OP_FADE: u8 = 0xC2;
const OP_FLASH: u8 = 0xC3;
const OP_FADE_ALL: u8 = 0xC6;
const OP_FLASH_ALL: u8 = 0xC7;

/// `0xFF` as a `tick_count` means "run indefinitely".
pub const TICK_COUNT_INDEFINITE: u8 = 0xFF;

/// Per-zone parameters for a broadcast fade (`fade_all`).
#[derive(Debug, Clone, Copy)]
pub struct FadeBlock {
    pub zone: Zone,
    pub tick_time: u8,
    pub tick_count: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Per-zone parameters for a broadcast flash (`flash_all`).
#[derive(Debug, Clone, Copy)]
pub struct FlashBlock {
    pub zone: Zone,
    pub tick_on: u8,
    pub tick_off: u8,
    pub tick_count: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Build the frame for `set_color(zone, r, g, b)`. `zone = All` is
/// valid here (it is the only lighting op that accepts it).
pub fn solid_color(zone: Zone, r: u8, g: u8, b: u8, msg: u8) -> [u8; 32] {
    let args = [0x02, zone.wire_byte(), r, g, b];
    build_command(OP_SOLID, &args, msg).expect("solid_color args always fit")
}

/// The canonical "lights off" request.
pub fn lights_off(msg: u8) -> [u8; 32] {
    solid_color(Zone::All, 0, 0, 0, msg)
}

/// Build the frame for a single-zone `fade`. `zone` must not be `All`
/// — broadcast fades go through [`fade_all`].
pub fn fade(zone: Zone, tick_time: u8, tick_count: u8, r: u8, g: u8, b: u8, msg: u8) -> [u8; 32] {
    let args = [0x02, zone.wire_byte(), tick_time, tick_count, r, g, b];
    build_command(OP_FADE, &args, msg).expect("fade args always fit")
}

/// Build the frame for broadcast `fade_all`. Blocks must be supplied
/// for center, left, and right, in that order, matching the device's
/// fixed expectation.
pub fn fade_all(blocks: [FadeBlock; 3], msg: u8) -> [u8; 32] {
    let mut args = Vec::with_capacity(2 + 6 * 3);
    args.push(0x02);
    for block in &blocks {
        args.extend_from_slice(&[
            block.zone.wire_byte(),
            block.tick_time,
            block.tick_count,
            block.r,
            block.g,
            block.b,
        ]);
    }
    debug_assert!(args.len() - 1 <= MAX_ARGS_LEN);
    build_command(OP_FADE_ALL, &args, msg).expect("fade_all args always fit")
}

/// Build the frame for a single-zone `flash`. `zone` must not be
/// `All` — broadcast flashes go through [`flash_all`].
pub fn flash(
    zone: Zone,
    tick_on: u8,
    tick_off: u8,
    tick_count: u8,
    r: u8,
    g: u8,
    b: u8,
    msg: u8,
) -> [u8; 32] {
    let args = [0x02, zone.wire_byte(), tick_on, tick_off, tick_count, r, g, b];
    build_command(OP_FLASH, &args, msg).expect("flash args always fit")
}

/// Build the frame for broadcast `flash_all`. Blocks must be supplied
/// for center, left, and right, in that order.
pub fn flash_all(blocks: [FlashBlock; 3], msg: u8) -> [u8; 32] {
    let mut args = Vec::with_capacity(2 + 7 * 3);
    args.push(0x02);
    for block in &blocks {
        args.extend_from_slice(&[
            block.zone.wire_byte(),
            block.tick_on,
            block.tick_off,
            block.tick_count,
            block.r,
            block.g,
            block.b,
        ]);
    }
    debug_assert!(args.len() - 1 <= MAX_ARGS_LEN);
    build_command(OP_FLASH_ALL, &args, msg).expect("flash_all args always fit")
}
