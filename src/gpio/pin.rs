//! Per-pin register operations
//!
//! Joystick switches close to ground and the lines are pulled up, so a pressed
//! switch reads as an electrical low. [`read_pin`] reports that already inverted.

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    Pin, PullRegisterScheme, RegisterBlock, GPFSEL0, GPLEV0, GPPUD, GPPUDCLK0, GPPUPPDN0,
    GPPUPPDN3, LEGACY_PULL_MARKER,
};

/// Minimum hold time between phases of the legacy pull handshake
const PULL_SETTLE: Duration = Duration::from_micros(10);

/// GPPUD control code for "pull-up"
const GPPUD_PULL_UP: u32 = 0b10;

/// GPPUPPDN field code for "pull-up"
const GPPUPPDN_PULL_UP: u32 = 0b01;

/// Switches `pin` to input by clearing its function-select field
pub fn set_pin_input(block: &RegisterBlock, pin: Pin) {
    let word = GPFSEL0 + pin.index() / 10;
    let shift = (pin.index() % 10) * 3;
    block.modify(word, |value| value & !(0b111 << shift));
}

/// Enables the pull-up resistor on `pin`
pub fn set_pin_pullup(block: &RegisterBlock, pin: Pin, scheme: PullRegisterScheme) {
    match scheme {
        PullRegisterScheme::Bcm2711 => bcm2711_pull_up(block, pin),
        PullRegisterScheme::Legacy => legacy_pull_up(block, pin),
    }
}

fn bcm2711_pull_up(block: &RegisterBlock, pin: Pin) {
    let word = GPPUPPDN0 + (pin.index() >> 4);
    let shift = (pin.index() & 0xF) << 1;
    block.modify(word, |value| {
        (value & !(0b11 << shift)) | (GPPUPPDN_PULL_UP << shift)
    });
}

fn legacy_pull_up(block: &RegisterBlock, pin: Pin) {
    let clock_word = GPPUDCLK0 + (pin.index() >> 5);
    let clock_bit = 1u32 << (pin.index() & 0x1F);

    // control must be stable on the line before and after the clock pulse
    block.write(GPPUD, GPPUD_PULL_UP);
    thread::sleep(PULL_SETTLE);
    block.write(clock_word, clock_bit);
    thread::sleep(PULL_SETTLE);
    block.write(GPPUD, 0);
    thread::sleep(PULL_SETTLE);
    block.write(clock_word, 0);
    thread::sleep(PULL_SETTLE);
}

/// Returns true when `pin` is pressed, i.e. the line reads low
pub fn read_pin(block: &RegisterBlock, pin: Pin) -> bool {
    let level = block.read(GPLEV0 + (pin.index() >> 5));
    level & (1 << (pin.index() & 0x1F)) == 0
}

/// Infers the pull scheme from the controller itself
///
/// Controllers without GPPUPPDN registers read back the "gpio" marker there.
pub fn probe_pull_scheme(block: &RegisterBlock) -> PullRegisterScheme {
    let marker = block.read(GPPUPPDN3);
    debug!("GPPUPPDN3 reads 0x{:08x}", marker);
    if marker == LEGACY_PULL_MARKER {
        PullRegisterScheme::Legacy
    } else {
        PullRegisterScheme::Bcm2711
    }
}

/// Logs when the controller disagrees with the detected board
pub(crate) fn check_pull_scheme(block: &RegisterBlock, expected: PullRegisterScheme) {
    let probed = probe_pull_scheme(block);
    if probed != expected {
        warn!(
            "Board profile expects {:?} pull registers but the controller looks like {:?}",
            expected, probed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{RegisterWindow, SimulatedWindow};
    use std::sync::Arc;

    fn block(scheme: PullRegisterScheme) -> (Arc<SimulatedWindow>, RegisterBlock) {
        let window = Arc::new(SimulatedWindow::new(scheme));
        let block = RegisterBlock::from_window(window.clone());
        (window, block)
    }

    fn pin(n: u8) -> Pin {
        Pin::new(n).unwrap()
    }

    #[test]
    fn input_mode_clears_only_own_field() {
        let (window, block) = block(PullRegisterScheme::Bcm2711);
        set_pin_input(&block, pin(17));
        // GPIO17 is field 7 of FSEL1
        assert_eq!(window.word(1), 0x0924_9249 & !(0b111 << 21));
        assert_eq!(window.word(0), 0x0924_9249);
    }

    #[test]
    fn every_pin_reads_after_input_setup() {
        let (_window, block) = block(PullRegisterScheme::Bcm2711);
        for n in 0..=Pin::MAX {
            set_pin_input(&block, pin(n));
            assert!(!read_pin(&block, pin(n)));
        }
    }

    #[test]
    fn low_line_reads_as_pressed() {
        let (window, block) = block(PullRegisterScheme::Legacy);
        window.set_level(pin(4), false);
        assert!(read_pin(&block, pin(4)));
        assert!(!read_pin(&block, pin(17)));
        window.set_level(pin(4), true);
        assert!(!read_pin(&block, pin(4)));
    }

    #[test]
    fn high_bank_uses_second_level_word() {
        let (window, block) = block(PullRegisterScheme::Bcm2711);
        window.set_level(pin(35), false);
        assert!(read_pin(&block, pin(35)));
        assert!(!read_pin(&block, pin(3)));
    }

    #[test]
    fn bcm2711_pull_up_sets_two_bit_field() {
        let (window, block) = block(PullRegisterScheme::Bcm2711);
        window.write_word(GPPUPPDN0 + 1, 0xFFFF_FFFF);
        window.clear_writes();

        // GPIO17 -> GPPUPPDN1, field 1
        set_pin_pullup(&block, pin(17), PullRegisterScheme::Bcm2711);
        assert_eq!(window.word(GPPUPPDN0 + 1), (0xFFFF_FFFF & !(0b11 << 2)) | (0b01 << 2));
        assert_eq!(window.writes(), vec![(GPPUPPDN0 + 1, window.word(GPPUPPDN0 + 1))]);
    }

    #[test]
    fn legacy_pull_up_runs_four_phase_handshake() {
        let (window, block) = block(PullRegisterScheme::Legacy);
        set_pin_pullup(&block, pin(22), PullRegisterScheme::Legacy);
        assert_eq!(
            window.writes(),
            vec![
                (GPPUD, 0b10),
                (GPPUDCLK0, 1 << 22),
                (GPPUD, 0),
                (GPPUDCLK0, 0),
            ]
        );
    }

    #[test]
    fn legacy_pull_up_holds_each_phase() {
        let (_window, block) = block(PullRegisterScheme::Legacy);
        let start = std::time::Instant::now();
        set_pin_pullup(&block, pin(22), PullRegisterScheme::Legacy);
        assert!(start.elapsed() >= 4 * PULL_SETTLE);
    }

    #[test]
    fn legacy_pull_up_clocks_second_bank() {
        let (window, block) = block(PullRegisterScheme::Legacy);
        set_pin_pullup(&block, pin(40), PullRegisterScheme::Legacy);
        assert_eq!(window.writes()[1], (GPPUDCLK0 + 1, 1 << 8));
    }

    #[test]
    fn probe_recognises_legacy_marker() {
        let (_w, legacy) = block(PullRegisterScheme::Legacy);
        let (_w, current) = block(PullRegisterScheme::Bcm2711);
        assert_eq!(probe_pull_scheme(&legacy), PullRegisterScheme::Legacy);
        assert_eq!(probe_pull_scheme(&current), PullRegisterScheme::Bcm2711);
    }
}
