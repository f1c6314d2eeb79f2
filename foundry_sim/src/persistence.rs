//! Save-file encoding of a factory's production state.
//!
//! The record is fixed width and carries no version tag:
//!
//! | offset | field         | type        |
//! |--------|---------------|-------------|
//! | 0      | `progress`    | f32, BE     |
//! | 4      | `warmup`      | f32, BE     |
//! | 8      | `outstanding` | i32, BE     |
//!
//! `phase` and `speed_factor` are not stored and start at zero after a load.

use std::io::{self, Read, Write};

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::FactoryState;

pub const RECORD_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactoryRecord {
    pub progress: f32,
    pub warmup: f32,
    pub outstanding: i32,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("factory record truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("factory record followed by {0} unexpected bytes")]
    Trailing(usize),
    #[error("factory record field `{field}` is corrupt: {reason}")]
    Corrupt { field: &'static str, reason: String },
    #[error("factory record codec failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("factory record io failed: {0}")]
    Io(#[from] io::Error),
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
}

impl FactoryRecord {
    fn validate(self) -> Result<Self, PersistError> {
        check_time("progress", self.progress)?;
        check_time("warmup", self.warmup)?;
        if self.outstanding < 0 {
            return Err(PersistError::Corrupt {
                field: "outstanding",
                reason: format!("negative count {}", self.outstanding),
            });
        }
        Ok(self)
    }
}

fn check_time(field: &'static str, value: f32) -> Result<(), PersistError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PersistError::Corrupt {
            field,
            reason: format!("expected a finite non-negative value, found {value}"),
        })
    }
}

impl FactoryState {
    pub fn to_record(&self) -> Result<FactoryRecord, PersistError> {
        let outstanding =
            i32::try_from(self.outstanding).map_err(|_| PersistError::Corrupt {
                field: "outstanding",
                reason: format!("count {} does not fit the record", self.outstanding),
            })?;
        Ok(FactoryRecord {
            progress: self.progress,
            warmup: self.warmup,
            outstanding,
        })
    }

    pub fn from_record(record: FactoryRecord) -> Result<Self, PersistError> {
        let record = record.validate()?;
        Ok(Self {
            progress: record.progress,
            warmup: record.warmup,
            outstanding: record.outstanding as u32,
            phase: 0.0,
            speed_factor: 0.0,
        })
    }
}

pub fn write_record(state: &FactoryState) -> Result<Vec<u8>, PersistError> {
    let bytes = codec().serialize(&state.to_record()?)?;
    debug_assert_eq!(bytes.len(), RECORD_LEN);
    Ok(bytes)
}

pub fn read_record(bytes: &[u8]) -> Result<FactoryState, PersistError> {
    if bytes.len() < RECORD_LEN {
        return Err(PersistError::Truncated {
            expected: RECORD_LEN,
            found: bytes.len(),
        });
    }
    if bytes.len() > RECORD_LEN {
        return Err(PersistError::Trailing(bytes.len() - RECORD_LEN));
    }
    let record: FactoryRecord = codec().deserialize(bytes)?;
    FactoryState::from_record(record)
}

pub fn write_to<W: Write>(writer: &mut W, state: &FactoryState) -> Result<(), PersistError> {
    writer.write_all(&write_record(state)?)?;
    Ok(())
}

/// Reads exactly one record from a stream, leaving anything after it unread.
pub fn read_from<R: Read>(reader: &mut R) -> Result<FactoryState, PersistError> {
    let mut buffer = Vec::with_capacity(RECORD_LEN);
    reader
        .take(RECORD_LEN as u64)
        .read_to_end(&mut buffer)?;
    read_record(&buffer)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    fn sample() -> FactoryState {
        FactoryState {
            progress: 0.5,
            phase: 41.0,
            speed_factor: 0.8,
            warmup: 1500.0,
            outstanding: 1,
        }
    }

    #[test]
    fn layout_is_big_endian_in_field_order() {
        let bytes = write_record(&sample()).expect("write");
        assert_eq!(bytes.len(), RECORD_LEN);
        insta::assert_snapshot!(hex(&bytes), @"3f00000044bb800000000001");
    }

    #[test]
    fn reload_keeps_stored_fields_bit_for_bit() {
        let state = FactoryState {
            progress: 123.456,
            warmup: f32::from_bits(0x4712_3457),
            ..sample()
        };
        let loaded = read_record(&write_record(&state).expect("write")).expect("read");
        assert_eq!(loaded.progress.to_bits(), state.progress.to_bits());
        assert_eq!(loaded.warmup.to_bits(), state.warmup.to_bits());
        assert_eq!(loaded.outstanding, state.outstanding);
    }

    #[test]
    fn phase_and_speed_are_not_stored() {
        let loaded = read_record(&write_record(&sample()).expect("write")).expect("read");
        assert_eq!(loaded.phase, 0.0);
        assert_eq!(loaded.speed_factor, 0.0);
    }

    #[test]
    fn short_input_is_truncated() {
        let bytes = write_record(&sample()).expect("write");
        let err = read_record(&bytes[..7]).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Truncated {
                expected: 12,
                found: 7
            }
        ));
    }

    #[test]
    fn long_input_is_rejected() {
        let mut bytes = write_record(&sample()).expect("write");
        bytes.push(0);
        assert!(matches!(read_record(&bytes), Err(PersistError::Trailing(1))));
    }

    #[test]
    fn negative_outstanding_is_corrupt() {
        let mut bytes = write_record(&sample()).expect("write");
        bytes[8..12].copy_from_slice(&(-3i32).to_be_bytes());
        assert!(matches!(
            read_record(&bytes),
            Err(PersistError::Corrupt {
                field: "outstanding",
                ..
            })
        ));
    }

    #[test]
    fn nan_progress_is_corrupt() {
        let mut bytes = write_record(&sample()).expect("write");
        bytes[0..4].copy_from_slice(&f32::NAN.to_be_bytes());
        assert!(matches!(
            read_record(&bytes),
            Err(PersistError::Corrupt {
                field: "progress",
                ..
            })
        ));
    }

    #[test]
    fn streams_read_one_record_at_a_time() {
        let mut wire = Vec::new();
        write_to(&mut wire, &sample()).expect("write first");
        let second = FactoryState {
            outstanding: 2,
            ..FactoryState::default()
        };
        write_to(&mut wire, &second).expect("write second");
        wire.extend_from_slice(&[1, 2]);

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_from(&mut cursor).expect("first").outstanding, 1);
        assert_eq!(read_from(&mut cursor).expect("second").outstanding, 2);
        assert!(matches!(
            read_from(&mut cursor),
            Err(PersistError::Truncated { found: 2, .. })
        ));
    }
}
