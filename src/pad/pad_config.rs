//! Pad identities and pin assignments
//!
//! A pad has 13 switch slots. The two built-in layouts follow the wiring of the
//! arcade hat (pad 2 uses the extra pins of the 40-pin B+ header);
//! custom layouts come from configuration, with `-1` marking an unused slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::ConfigError;
use crate::gpio::{set_pin_input, set_pin_pullup, Pin, PullRegisterScheme, RegisterBlock};

/// Number of switch slots on a pad
pub const SLOT_COUNT: usize = 13;

/// Config value that marks a slot as unused
pub const UNUSED_PIN: i64 = -1;

const BUILTIN_P1: [u8; SLOT_COUNT] = [4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15, 14, 2];
const BUILTIN_P2: [u8; SLOT_COUNT] = [11, 5, 6, 13, 19, 26, 21, 20, 16, 12, 7, 8, 3];

/// Pad layouts the driver knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadKind {
    BuiltinP1,
    BuiltinP2,
    Custom1,
    Custom2,
}

impl PadKind {
    /// Numeric identity used by the `pads` option
    pub const fn code(self) -> u16 {
        match self {
            PadKind::BuiltinP1 => 1,
            PadKind::BuiltinP2 => 2,
            PadKind::Custom1 => 3,
            PadKind::Custom2 => 4,
        }
    }

    /// Resolves a numeric identity; 0 means "no pad in this slot"
    pub fn from_code(code: i64) -> Result<Option<Self>, ConfigError> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(PadKind::BuiltinP1)),
            2 => Ok(Some(PadKind::BuiltinP2)),
            3 => Ok(Some(PadKind::Custom1)),
            4 => Ok(Some(PadKind::Custom2)),
            other => Err(ConfigError::UnknownPadType(other.to_string())),
        }
    }

    pub fn from_name(name: &str) -> Result<Option<Self>, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(None),
            "p1" | "gpio1" => Ok(Some(PadKind::BuiltinP1)),
            "p2" | "gpio2" => Ok(Some(PadKind::BuiltinP2)),
            "custom1" => Ok(Some(PadKind::Custom1)),
            "custom2" => Ok(Some(PadKind::Custom2)),
            _ => Err(ConfigError::UnknownPadType(name.to_string())),
        }
    }

    /// Device name announced to the input sink
    pub const fn device_name(self) -> &'static str {
        match self {
            PadKind::BuiltinP1 | PadKind::Custom1 => "GPIO Controller 1",
            PadKind::BuiltinP2 | PadKind::Custom2 => "GPIO Controller 2",
        }
    }
}

impl fmt::Display for PadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadKind::BuiltinP1 => write!(f, "GPIO pad 1"),
            PadKind::BuiltinP2 => write!(f, "GPIO pad 2"),
            PadKind::Custom1 => write!(f, "custom pad 1"),
            PadKind::Custom2 => write!(f, "custom pad 2"),
        }
    }
}

/// A pad identity as written in configuration: a code or a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PadSpec {
    Code(i64),
    Name(String),
}

impl PadSpec {
    pub fn resolve(&self) -> Result<Option<PadKind>, ConfigError> {
        match self {
            PadSpec::Code(code) => PadKind::from_code(*code),
            PadSpec::Name(name) => PadKind::from_name(name),
        }
    }
}

/// Switch slots in wiring order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
    TR,
    Y,
    X,
    TL,
    Mode,
}

impl Slot {
    pub const ALL: [Slot; SLOT_COUNT] = [
        Slot::Up,
        Slot::Down,
        Slot::Left,
        Slot::Right,
        Slot::Start,
        Slot::Select,
        Slot::A,
        Slot::B,
        Slot::TR,
        Slot::Y,
        Slot::X,
        Slot::TL,
        Slot::Mode,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The GPIO line behind each slot, `None` for unused slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAssignment {
    pins: [Option<Pin>; SLOT_COUNT],
}

impl PinAssignment {
    fn from_builtin(table: &[u8; SLOT_COUNT]) -> Self {
        Self {
            pins: table.map(Pin::new),
        }
    }

    /// Validates a custom list of exactly [`SLOT_COUNT`] entries
    pub fn from_config(kind: PadKind, values: &[i64]) -> Result<Self, ConfigError> {
        if values.len() != SLOT_COUNT {
            return Err(ConfigError::InvalidPinCount {
                kind,
                expected: SLOT_COUNT,
                count: values.len(),
            });
        }

        let mut pins = [None; SLOT_COUNT];
        for (slot, &value) in pins.iter_mut().zip(values) {
            if value == UNUSED_PIN {
                continue;
            }
            let pin = Pin::try_from(value).map_err(|value| ConfigError::InvalidPin { kind, value })?;
            *slot = Some(pin);
        }
        Ok(Self { pins })
    }

    pub fn pin(&self, slot: Slot) -> Option<Pin> {
        self.pins[slot.index()]
    }

    /// Slots paired with their pins, in wiring order
    pub fn iter(&self) -> impl Iterator<Item = (Slot, Option<Pin>)> + '_ {
        Slot::ALL.iter().map(move |&slot| (slot, self.pin(slot)))
    }

    /// Pins that are actually wired
    pub fn used_pins(&self) -> impl Iterator<Item = Pin> + '_ {
        self.pins.iter().flatten().copied()
    }

    /// Puts every wired pin into pulled-up input mode
    pub fn configure(&self, block: &RegisterBlock, scheme: PullRegisterScheme) {
        for pin in self.used_pins() {
            set_pin_input(block, pin);
            set_pin_pullup(block, pin, scheme);
        }
    }
}

/// Builds the pin assignment for `kind`
///
/// Built-in layouts ignore `custom_pins`; custom layouts require it.
pub fn build(kind: PadKind, custom_pins: Option<&[i64]>) -> Result<PinAssignment, ConfigError> {
    let assignment = match kind {
        PadKind::BuiltinP1 => PinAssignment::from_builtin(&BUILTIN_P1),
        PadKind::BuiltinP2 => PinAssignment::from_builtin(&BUILTIN_P2),
        PadKind::Custom1 | PadKind::Custom2 => {
            let values = custom_pins.ok_or(ConfigError::MissingPinList(kind))?;
            PinAssignment::from_config(kind, values)?
        }
    };
    debug!(
        "{} uses {} of {} slots",
        kind,
        assignment.used_pins().count(),
        SLOT_COUNT
    );
    Ok(assignment)
}
