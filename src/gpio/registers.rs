//! Memory-mapped GPIO register window
//!
//! [`RegisterBlock`] owns one window of [`REGISTER_WINDOW_WORDS`] words for the
//! lifetime of the driver. The backing storage is pluggable through
//! [`RegisterWindow`]: the real controller mapped with `memmap2`, or an
//! in-memory [`SimulatedWindow`] for development machines and tests.

use memmap2::{MmapOptions, MmapRaw};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr::{read_volatile, write_volatile};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::{
    BoardProfile, GpioError, Pin, PullRegisterScheme, GPIO_BASE_OFFSET, GPLEV0, GPPUPPDN3,
    LEGACY_PULL_MARKER, REGISTER_WINDOW_WORDS,
};

/// Word-addressed access to a GPIO register window
///
/// Offsets are always below [`REGISTER_WINDOW_WORDS`]; implementations may
/// assume that.
pub trait RegisterWindow: Send + Sync {
    fn read_word(&self, offset: usize) -> u32;

    fn write_word(&self, offset: usize, value: u32);
}

impl<W: RegisterWindow + ?Sized> RegisterWindow for Arc<W> {
    fn read_word(&self, offset: usize) -> u32 {
        (**self).read_word(offset)
    }

    fn write_word(&self, offset: usize, value: u32) {
        (**self).write_word(offset, value)
    }
}

/// Handle over the mapped GPIO controller
///
/// Writes happen only while pads are being configured; afterwards the polling
/// task is the single reader, so no locking is done here.
pub struct RegisterBlock {
    window: Box<dyn RegisterWindow>,
}

impl RegisterBlock {
    pub fn from_window(window: impl RegisterWindow + 'static) -> Self {
        Self {
            window: Box::new(window),
        }
    }

    pub(crate) fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset < REGISTER_WINDOW_WORDS);
        self.window.read_word(offset)
    }

    pub(crate) fn write(&self, offset: usize, value: u32) {
        debug_assert!(offset < REGISTER_WINDOW_WORDS);
        self.window.write_word(offset, value)
    }

    pub(crate) fn modify(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read(offset);
        self.write(offset, f(value));
    }
}

/// Where the register window comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    /// `/dev/mem` at the physical controller address (requires root)
    #[default]
    Mem,
    /// `/dev/gpiomem`, which exposes only the GPIO block at offset 0
    Gpiomem,
    /// In-memory registers with every line pulled high
    Simulated,
}

impl MappingSource {
    pub fn default_device(self) -> Option<&'static Path> {
        match self {
            MappingSource::Mem => Some(Path::new("/dev/mem")),
            MappingSource::Gpiomem => Some(Path::new("/dev/gpiomem")),
            MappingSource::Simulated => None,
        }
    }

    fn file_offset(self, profile: &BoardProfile) -> u64 {
        match self {
            MappingSource::Mem => profile.base_address + GPIO_BASE_OFFSET,
            MappingSource::Gpiomem | MappingSource::Simulated => 0,
        }
    }
}

/// Maps the GPIO controller of `profile`
///
/// `device` overrides the default device node of `source`.
pub fn map_registers(
    profile: &BoardProfile,
    source: MappingSource,
    device: Option<&Path>,
) -> Result<RegisterBlock, GpioError> {
    if source == MappingSource::Simulated {
        info!("Using simulated GPIO registers for {}", profile.model);
        return Ok(RegisterBlock::from_window(SimulatedWindow::new(
            profile.pull_scheme,
        )));
    }
    let Some(path) = device.or_else(|| source.default_device()) else {
        return Err(GpioError::Mapping {
            device: PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no device node"),
        });
    };

    let offset = source.file_offset(profile);
    debug!(
        "Mapping {} GPIO words from {} at offset 0x{:08x}",
        REGISTER_WINDOW_WORDS,
        path.display(),
        offset
    );

    let window = MappedWindow::open(path, offset).map_err(|source| GpioError::Mapping {
        device: path.to_path_buf(),
        source,
    })?;
    info!("GPIO registers mapped through {}", path.display());
    Ok(RegisterBlock::from_window(window))
}

struct MappedWindow {
    map: MmapRaw,
}

impl MappedWindow {
    fn open(path: &Path, offset: u64) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = MmapOptions::new()
            .offset(offset)
            .len(REGISTER_WINDOW_WORDS * std::mem::size_of::<u32>())
            .map_raw(&file)?;
        Ok(Self { map })
    }

    fn word_ptr(&self, offset: usize) -> *mut u32 {
        // SAFETY: the mapping is REGISTER_WINDOW_WORDS words long and offsets are
        // bounded by the caller; the base is page aligned so the cast is aligned.
        unsafe { self.map.as_mut_ptr().cast::<u32>().add(offset) }
    }
}

impl RegisterWindow for MappedWindow {
    fn read_word(&self, offset: usize) -> u32 {
        // SAFETY: see word_ptr; device registers require volatile access
        unsafe { read_volatile(self.word_ptr(offset)) }
    }

    fn write_word(&self, offset: usize, value: u32) {
        // SAFETY: see word_ptr
        unsafe { write_volatile(self.word_ptr(offset), value) }
    }
}

/// In-memory stand-in for the GPIO controller
///
/// Level registers start with every line high (released, since inputs are
/// pulled up). Every write is recorded so register sequences can be inspected.
pub struct SimulatedWindow {
    words: Vec<AtomicU32>,
    writes: Mutex<Vec<(usize, u32)>>,
}

impl SimulatedWindow {
    pub fn new(scheme: PullRegisterScheme) -> Self {
        let words: Vec<AtomicU32> = (0..REGISTER_WINDOW_WORDS)
            .map(|_| AtomicU32::new(0))
            .collect();
        words[GPLEV0].store(u32::MAX, Ordering::SeqCst);
        words[GPLEV0 + 1].store(u32::MAX, Ordering::SeqCst);
        // FSEL words come up as all-output so input mode is observable
        for word in words.iter().take(6) {
            word.store(0x0924_9249, Ordering::SeqCst);
        }
        if scheme == PullRegisterScheme::Legacy {
            words[GPPUPPDN3].store(LEGACY_PULL_MARKER, Ordering::SeqCst);
        }
        Self {
            words,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Drives the electrical level of `pin`
    pub fn set_level(&self, pin: Pin, high: bool) {
        let word = &self.words[GPLEV0 + (pin.index() >> 5)];
        let mask = 1u32 << (pin.index() & 31);
        if high {
            word.fetch_or(mask, Ordering::SeqCst);
        } else {
            word.fetch_and(!mask, Ordering::SeqCst);
        }
    }

    pub fn word(&self, offset: usize) -> u32 {
        self.words[offset].load(Ordering::SeqCst)
    }

    /// Every `(offset, value)` written so far, oldest first
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_writes(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl RegisterWindow for SimulatedWindow {
    fn read_word(&self, offset: usize) -> u32 {
        self.words[offset].load(Ordering::SeqCst)
    }

    fn write_word(&self, offset: usize, value: u32) {
        self.words[offset].store(value, Ordering::SeqCst);
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((offset, value));
    }
}
