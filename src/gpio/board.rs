//! Board detection
//!
//! The peripheral base address and the pull-up register layout both depend on the
//! SoC generation. They are derived from the primary part number of the CPU's
//! Main ID Register (MIDR), which is exposed by the kernel in sysfs and, on older
//! kernels, only through `/proc/cpuinfo`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use tracing::{debug, info};

use super::GpioError;

const MIDR_SYSFS_PATH: &str = "/sys/devices/system/cpu/cpu0/regs/identification/midr_el1";
const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// How pull-up resistors are programmed on this controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullRegisterScheme {
    /// BCM2835/6/7: GPPUD + GPPUDCLK clocked handshake
    Legacy,
    /// BCM2711: direct 2-bit fields in GPPUPPDN0..3
    Bcm2711,
}

/// Supported Raspberry Pi generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardModel {
    Rpi01,
    Rpi2,
    Rpi3,
    Rpi4,
}

impl BoardModel {
    /// Primary part number found in MIDR bits [15:4]
    pub const fn cpu_part(self) -> u32 {
        match self {
            BoardModel::Rpi01 => 0xB76,
            BoardModel::Rpi2 => 0xC07,
            BoardModel::Rpi3 => 0xD03,
            BoardModel::Rpi4 => 0xD08,
        }
    }

    pub fn from_cpu_part(part: u32) -> Option<Self> {
        match part {
            0xB76 => Some(BoardModel::Rpi01),
            0xC07 => Some(BoardModel::Rpi2),
            0xD03 => Some(BoardModel::Rpi3),
            0xD08 => Some(BoardModel::Rpi4),
            _ => None,
        }
    }

    pub const fn profile(self) -> BoardProfile {
        let (base_address, pull_scheme) = match self {
            BoardModel::Rpi01 => (0x2000_0000, PullRegisterScheme::Legacy),
            BoardModel::Rpi2 | BoardModel::Rpi3 => (0x3F00_0000, PullRegisterScheme::Legacy),
            BoardModel::Rpi4 => (0xFE00_0000, PullRegisterScheme::Bcm2711),
        };
        BoardProfile {
            model: self,
            base_address,
            pull_scheme,
        }
    }
}

impl fmt::Display for BoardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardModel::Rpi01 => write!(f, "Rpi0/1"),
            BoardModel::Rpi2 => write!(f, "Rpi2"),
            BoardModel::Rpi3 => write!(f, "Rpi3"),
            BoardModel::Rpi4 => write!(f, "Rpi4"),
        }
    }
}

/// Register layout facts for the running board, fixed after detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardProfile {
    pub model: BoardModel,
    /// Physical peripheral base address
    pub base_address: u64,
    pub pull_scheme: PullRegisterScheme,
}

/// Maps a raw MIDR value to the board profile
pub fn detect_board(midr: u32) -> Result<BoardProfile, GpioError> {
    let part = (midr >> 4) & 0xFFF;
    match BoardModel::from_cpu_part(part) {
        Some(model) => {
            let profile = model.profile();
            info!(
                "Found {} with memory base at 0x{:08x}",
                model, profile.base_address
            );
            Ok(profile)
        }
        None => Err(GpioError::UnknownBoard { part }),
    }
}

/// Reads the MIDR of CPU 0
///
/// Prefers the sysfs register dump and falls back to the `CPU ...` lines of
/// `/proc/cpuinfo`.
pub fn read_cpu_identifier() -> Result<u32, GpioError> {
    match fs::read_to_string(MIDR_SYSFS_PATH) {
        Ok(content) => {
            if let Some(midr) = parse_midr(&content) {
                debug!("Read MIDR 0x{:08x} from {}", midr, MIDR_SYSFS_PATH);
                return Ok(midr);
            }
            debug!("Unparseable MIDR in {}: {:?}", MIDR_SYSFS_PATH, content);
        }
        Err(e) => debug!("{} not available: {}", MIDR_SYSFS_PATH, e),
    }

    let cpuinfo = fs::read_to_string(CPUINFO_PATH)
        .map_err(|e| GpioError::IdentifierUnavailable(format!("{}: {}", CPUINFO_PATH, e)))?;
    let midr = parse_cpuinfo(&cpuinfo).ok_or_else(|| {
        GpioError::IdentifierUnavailable(format!("no CPU part in {}", CPUINFO_PATH))
    })?;
    debug!("Composed MIDR 0x{:08x} from {}", midr, CPUINFO_PATH);
    Ok(midr)
}

fn parse_hex(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).ok()
}

/// Parses the sysfs form, e.g. `0x00000000410fd083`
fn parse_midr(content: &str) -> Option<u32> {
    parse_hex(content).map(|v| v as u32)
}

/// Rebuilds a MIDR from the first CPU block of `/proc/cpuinfo`
fn parse_cpuinfo(content: &str) -> Option<u32> {
    let mut implementer = 0u32;
    let mut variant = 0u32;
    let mut part = None;
    let mut revision = 0u32;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "CPU implementer" => implementer = parse_hex(value).unwrap_or(0) as u32,
            "CPU variant" => variant = parse_hex(value).unwrap_or(0) as u32,
            "CPU part" => {
                if part.is_none() {
                    part = parse_hex(value).map(|v| v as u32);
                }
            }
            "CPU revision" => revision = value.trim().parse().unwrap_or(0),
            _ => {}
        }
        // first core is enough
        if line.trim().is_empty() && part.is_some() {
            break;
        }
    }

    part.map(|part| {
        (implementer & 0xFF) << 24
            | (variant & 0xF) << 20
            | 0xF << 16
            | (part & 0xFFF) << 4
            | (revision & 0xF)
    })
}
