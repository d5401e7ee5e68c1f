//! Non-volatile persistence of the active schedule state.
//!
//! The engine's state survives power loss as a fixed-size snapshot record at
//! a well-known address of a byte-addressable store with explicit commit.
//! There is no version field; a schema change requires wiping the image, and
//! an unrecognized marker byte simply reads back as "no snapshot".

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::constants::{MAXIMUM_INTENSITY, MINIMUM_INTENSITY, NV_IMAGE_SIZE, SNAPSHOT_ADDRESS};
use crate::schedule::{Span, TimeOfDay, WeekendOverride};

/// Byte length of the serialized snapshot record.
pub const SNAPSHOT_LEN: usize = 20;

/// Marker byte written on commit; doubles as the validity check on load.
const SNAPSHOT_MARKER: u8 = 0xA5;

/// Fill byte for the weekend fields when no override is configured.
const NO_WEEKEND_FILL: u8 = 0xFF;

const FLAG_DST: u8 = 1;
const FLAG_DAY_ACTIVE: u8 = 1 << 1;
const FLAG_NIGHT_ACTIVE: u8 = 1 << 2;
const FLAG_HAS_WEEKEND: u8 = 1 << 3;

/// Byte-addressable non-volatile store with explicit durable commit.
pub trait NvStore {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// Reads beyond the image yield zero bytes.
    fn read(&self, addr: usize, buf: &mut [u8]);

    /// Write `data` into the image starting at `addr`.
    ///
    /// Not durable until `commit`; writes beyond the image are dropped.
    fn write(&mut self, addr: usize, data: &[u8]);

    /// Flush the image to durable storage.
    ///
    /// Returns true only when the data is durably committed, not merely
    /// buffered.
    fn commit(&mut self) -> bool;
}

/// Fixed-size serialized record of the engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub dst_active: bool,
    pub day: Span,
    pub night: Span,
    pub weekend: Option<WeekendOverride>,
    pub day_intensity: u8,
    pub night_intensity: u8,
    pub day_active: bool,
    pub night_active: bool,
}

impl Snapshot {
    /// Serialize into the fixed on-store layout.
    pub fn encode(&self) -> [u8; SNAPSHOT_LEN] {
        let mut record = [0u8; SNAPSHOT_LEN];
        record[0] = SNAPSHOT_MARKER;

        let mut flags = 0u8;
        if self.dst_active {
            flags |= FLAG_DST;
        }
        if self.day_active {
            flags |= FLAG_DAY_ACTIVE;
        }
        if self.night_active {
            flags |= FLAG_NIGHT_ACTIVE;
        }
        if self.weekend.is_some() {
            flags |= FLAG_HAS_WEEKEND;
        }
        record[1] = flags;

        encode_span(&mut record[2..6], &self.day);
        encode_span(&mut record[6..10], &self.night);
        match &self.weekend {
            Some(weekend) => {
                encode_span(&mut record[10..14], &weekend.day);
                encode_span(&mut record[14..18], &weekend.night);
            }
            None => record[10..18].fill(NO_WEEKEND_FILL),
        }
        record[18] = self.day_intensity;
        record[19] = self.night_intensity;
        record
    }

    /// Deserialize, re-validating every field range.
    ///
    /// Returns `None` for blank or corrupt images.
    pub fn decode(record: &[u8; SNAPSHOT_LEN]) -> Option<Self> {
        if record[0] != SNAPSHOT_MARKER {
            return None;
        }
        let flags = record[1];
        if flags & !(FLAG_DST | FLAG_DAY_ACTIVE | FLAG_NIGHT_ACTIVE | FLAG_HAS_WEEKEND) != 0 {
            return None;
        }

        let day = decode_span(&record[2..6])?;
        let night = decode_span(&record[6..10])?;
        let weekend = if flags & FLAG_HAS_WEEKEND != 0 {
            Some(WeekendOverride {
                day: decode_span(&record[10..14])?,
                night: decode_span(&record[14..18])?,
            })
        } else {
            None
        };

        let day_intensity = record[18];
        let night_intensity = record[19];
        for intensity in [day_intensity, night_intensity] {
            if !(MINIMUM_INTENSITY..=MAXIMUM_INTENSITY).contains(&intensity) {
                return None;
            }
        }

        Some(Self {
            dst_active: flags & FLAG_DST != 0,
            day,
            night,
            weekend,
            day_intensity,
            night_intensity,
            day_active: flags & FLAG_DAY_ACTIVE != 0,
            night_active: flags & FLAG_NIGHT_ACTIVE != 0,
        })
    }
}

fn encode_span(buf: &mut [u8], span: &Span) {
    buf[0] = span.start.hour();
    buf[1] = span.start.minute();
    buf[2] = span.end.hour();
    buf[3] = span.end.minute();
}

fn decode_span(buf: &[u8]) -> Option<Span> {
    let start = TimeOfDay::new(buf[0], buf[1]).ok()?;
    let end = TimeOfDay::new(buf[2], buf[3]).ok()?;
    Some(Span { start, end })
}

/// Read the snapshot from its well-known address.
pub fn load_snapshot(store: &dyn NvStore) -> Option<Snapshot> {
    let mut record = [0u8; SNAPSHOT_LEN];
    store.read(SNAPSHOT_ADDRESS, &mut record);
    Snapshot::decode(&record)
}

/// Write and durably commit the snapshot.
///
/// Returns the commit outcome; a false return leaves the previous durable
/// state untouched as far as the caller knows, and the next save retries
/// from scratch.
pub fn save_snapshot(store: &mut dyn NvStore, snapshot: &Snapshot) -> bool {
    store.write(SNAPSHOT_ADDRESS, &snapshot.encode());
    store.commit()
}

/// Volatile in-memory store, for tests and ephemeral runs.
pub struct MemoryStore {
    image: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            image: vec![0; NV_IMAGE_SIZE],
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NvStore for MemoryStore {
    fn read(&self, addr: usize, buf: &mut [u8]) {
        read_image(&self.image, addr, buf);
    }

    fn write(&mut self, addr: usize, data: &[u8]) {
        write_image(&mut self.image, addr, data);
    }

    fn commit(&mut self) -> bool {
        true
    }
}

/// File-backed image emulating byte-addressable non-volatile memory.
///
/// The whole image is held in memory; `commit` rewrites the backing file and
/// fsyncs it, so the returned boolean reflects durable success.
pub struct FileStore {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStore {
    /// Open the store, creating parent directories and loading any existing
    /// image from a previous run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {parent:?}"))?;
        }
        let image = match fs::read(&path) {
            Ok(mut bytes) => {
                bytes.resize(NV_IMAGE_SIZE, 0);
                bytes
            }
            Err(_) => vec![0; NV_IMAGE_SIZE],
        };
        Ok(Self { path, image })
    }
}

impl NvStore for FileStore {
    fn read(&self, addr: usize, buf: &mut [u8]) {
        read_image(&self.image, addr, buf);
    }

    fn write(&mut self, addr: usize, data: &[u8]) {
        write_image(&mut self.image, addr, data);
    }

    fn commit(&mut self) -> bool {
        let result = fs::File::create(&self.path).and_then(|mut file| {
            use std::io::Write;
            file.write_all(&self.image)?;
            file.sync_all()
        });
        result.is_ok()
    }
}

fn read_image(image: &[u8], addr: usize, buf: &mut [u8]) {
    buf.fill(0);
    if addr >= image.len() {
        return;
    }
    let len = buf.len().min(image.len() - addr);
    buf[..len].copy_from_slice(&image[addr..addr + len]);
}

fn write_image(image: &mut [u8], addr: usize, data: &[u8]) {
    if addr >= image.len() {
        return;
    }
    let len = data.len().min(image.len() - addr);
    image[addr..addr + len].copy_from_slice(&data[..len]);
}
