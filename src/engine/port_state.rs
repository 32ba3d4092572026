// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bit-packed connection state.
//!
//! Each connection carries one word. The low bits record where the
//! connection is in its pull/push handshake and whether either side has
//! closed it. Every handshake transition is a single XOR with a flip mask,
//! and an event on the queue is decoded from these bits alone.
//!
//! ```text
//!   IN_READY --pull--> PULLING --(deliver)--> OUT_READY --push--> PUSHING --(deliver)--> IN_READY
//! ```

/// The input side may pull.
pub const IN_READY: u32 = 1;
/// A pull is on its way to the output side.
pub const PULLING: u32 = 2;
/// An element is on its way to the input side.
pub const PUSHING: u32 = 4;
/// The output side may push.
pub const OUT_READY: u32 = 8;
/// The input side has cancelled.
pub const IN_CLOSED: u32 = 16;
/// The output side has completed or failed.
pub const OUT_CLOSED: u32 = 32;
/// The output side has failed; the slot holds the failure.
pub const IN_FAILED: u32 = 64;

pub const PULL_START_FLIP: u32 = IN_READY | PULLING;
pub const PULL_END_FLIP: u32 = PULLING | OUT_READY;
pub const PUSH_START_FLIP: u32 = PUSHING | OUT_READY;
pub const PUSH_END_FLIP: u32 = IN_READY | PUSHING;

/// Set in a stage's shutdown counter while it keeps running with all ports closed.
pub const KEEP_GOING_FLAG: u32 = 0x400_0000;
pub const KEEP_GOING_MASK: u32 = 0x3ff_ffff;

/// Human-readable rendering of a state word for snapshots.
pub fn describe(state: u32) -> String {
    const NAMES: [(u32, &str); 7] = [
        (IN_READY, "InReady"),
        (PULLING, "Pulling"),
        (PUSHING, "Pushing"),
        (OUT_READY, "OutReady"),
        (IN_CLOSED, "InClosed"),
        (OUT_CLOSED, "OutClosed"),
        (IN_FAILED, "InFailed"),
    ];
    let parts: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| state & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if parts.is_empty() {
        "Idle".to_string()
    } else {
        parts.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_masks_have_expected_values() {
        assert_eq!(PULL_START_FLIP, 3);
        assert_eq!(PULL_END_FLIP, 10);
        assert_eq!(PUSH_START_FLIP, 12);
        assert_eq!(PUSH_END_FLIP, 5);
    }

    #[test]
    fn test_full_handshake_returns_to_in_ready() {
        let mut state = IN_READY;
        state ^= PULL_START_FLIP;
        assert_eq!(state, PULLING);
        state ^= PULL_END_FLIP;
        assert_eq!(state, OUT_READY);
        state ^= PUSH_START_FLIP;
        assert_eq!(state, PUSHING);
        state ^= PUSH_END_FLIP;
        assert_eq!(state, IN_READY);
    }

    #[test]
    fn test_flips_leave_close_bits_untouched() {
        let state = IN_READY | OUT_CLOSED;
        assert_eq!((state ^ PULL_START_FLIP) & OUT_CLOSED, OUT_CLOSED);
        assert_eq!(KEEP_GOING_FLAG & KEEP_GOING_MASK, 0);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(IN_READY), "InReady");
        assert_eq!(describe(PUSHING | IN_CLOSED), "Pushing|InClosed");
        assert_eq!(describe(0), "Idle");
    }
}
