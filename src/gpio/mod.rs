//! Register access layer for the BCM283x/BCM2711 GPIO controller
//!
//! Everything that touches the memory-mapped GPIO window lives here:
//!
//! 1. [`board`] - CPU identification and the per-board register profile
//! 2. [`registers`] - The mapped register window and its backends
//! 3. [`pin`] - Input mode, pull-up configuration and level reads
//!
//! # Register Window
//!
//! ```text
//! word  0..=5   GPFSEL    function select, 10 pins per word, 3 bits per pin
//! word  7       GPSET0    output set (reserved, not written)
//! word 10       GPCLR0    output clear (reserved, not written)
//! word 13..=14  GPLEV     pin level
//! word 37       GPPUD     legacy pull control
//! word 38..=39  GPPUDCLK  legacy pull clock
//! word 57..=60  GPPUPPDN  BCM2711 pull-up/down, 2 bits per pin
//! ```
//!
//! Upper layers only ever see [`Pin`] values and the functions in [`pin`];
//! raw word offsets stay inside this module.

pub mod board;
pub mod pin;
pub mod registers;

use std::fmt;
use std::path::PathBuf;

pub use board::{detect_board, read_cpu_identifier, BoardModel, BoardProfile, PullRegisterScheme};
pub use pin::{probe_pull_scheme, read_pin, set_pin_input, set_pin_pullup};
pub use registers::{map_registers, MappingSource, RegisterBlock, RegisterWindow, SimulatedWindow};

/// Offset of the GPIO controller from the peripheral base address
pub const GPIO_BASE_OFFSET: u64 = 0x0020_0000;

/// Size of the mapped window in 32-bit words
pub const REGISTER_WINDOW_WORDS: usize = 176;

pub(crate) const GPFSEL0: usize = 0;
pub(crate) const GPLEV0: usize = 13;
pub(crate) const GPPUD: usize = 37;
pub(crate) const GPPUDCLK0: usize = 38;
pub(crate) const GPPUPPDN0: usize = 57;
pub(crate) const GPPUPPDN3: usize = 60;

/// Value read back from GPPUPPDN3 on controllers without the BCM2711 pull registers ("gpio")
pub(crate) const LEGACY_PULL_MARKER: u32 = 0x6770_696f;

/// A BCM GPIO line number that is valid on every supported board
///
/// Construction is the only validation point; register helpers trust any `Pin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin(u8);

impl Pin {
    /// Highest GPIO line shared by all supported SoCs
    pub const MAX: u8 = 53;

    pub const fn new(number: u8) -> Option<Self> {
        if number <= Self::MAX {
            Some(Self(number))
        } else {
            None
        }
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<i64> for Pin {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Pin::new)
            .ok_or(value)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Errors raised while locating or mapping the GPIO controller
///
/// Both variants are fatal: no pad can be set up without a mapped window.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// The CPU part number is not one of the supported Raspberry Pi boards
    #[error("Unsupported board: unknown CPU part number 0x{part:03x}")]
    UnknownBoard { part: u32 },

    /// The CPU identifier could not be read from the system
    #[error("Unable to read CPU identifier: {0}")]
    IdentifierUnavailable(String),

    /// The register window could not be mapped
    #[error("Failed to map GPIO registers through {}: {source}", device.display())]
    Mapping {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
