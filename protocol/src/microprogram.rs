//! Decoder for PPC3 configuration streams.
//!
//! TI's "PurePath Console 3" tool exports DSP coefficient dumps as a flat
//! byte stream of `(register, value)` pairs with three meta opcodes mixed
//! in. The stream always has an even length, so every opcode consumes an
//! even number of bytes overall:
//!
//! * `0xFE ms` - wait `ms` milliseconds before the next write
//! * `0xFD n base v0 .. v(n-2)` - burst of `n - 1` values to consecutive
//!   registers starting at `base`
//! * `0xF0 len ..` - `len` bytes of embedded ASCII annotation to skip
//! * anything else - a plain single register write

use bytes::{Buf, Bytes};
#[cfg(feature = "debug")]
use thiserror::Error;

use crate::util::{TryBuf, TryBufError};

pub const META_DELAY: u8 = 0xFE;
pub const META_BURST: u8 = 0xFD;
pub const META_ASCII: u8 = 0xF0;

#[cfg_attr(feature = "debug", derive(Debug, Error))]
#[derive(Clone, PartialEq, Eq)]
pub enum FirmwareError {
    #[cfg_attr(feature = "debug", error("firmware too short: {len} bytes"))]
    TooShort { len: usize },

    #[cfg_attr(feature = "debug", error("firmware has odd length: {len} bytes"))]
    OddLength { len: usize },

    #[cfg_attr(
        feature = "debug",
        error("firmware truncated: {remaining} bytes left, {required} needed")
    )]
    Truncated { remaining: usize, required: usize },

    #[cfg_attr(feature = "debug", error("burst with length byte {0}"))]
    BadBurst(u8),
}

impl From<TryBufError> for FirmwareError {
    fn from(e: TryBufError) -> Self {
        let TryBufError::InvalidLength {
            remaining,
            required,
        } = e;
        FirmwareError::Truncated {
            remaining,
            required,
        }
    }
}

/// One decoded unit of a PPC3 stream.
#[cfg_attr(feature = "debug", derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub enum Opcode {
    /// Wait before issuing the next write.
    Delay { ms: u8 },
    /// Write `values` to consecutive registers starting at `base`.
    Burst { base: u8, values: Bytes },
    /// Embedded ASCII annotation, already skipped over.
    SkipText { len: u8 },
    /// Plain single register write.
    Write { reg: u8, value: u8 },
}

/// Pull-style decoder over a PPC3 stream.
///
/// Construction validates the outer framing (at least one pair, even
/// length); per-opcode truncation is only detectable while decoding and
/// surfaces from [`Reader::next_opcode`].
#[cfg_attr(feature = "debug", derive(Debug))]
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(data: Bytes) -> Result<Self, FirmwareError> {
        let len = data.len();
        if len < 2 {
            return Err(FirmwareError::TooShort { len });
        }
        if len % 2 != 0 {
            return Err(FirmwareError::OddLength { len });
        }
        Ok(Reader { buf: data })
    }

    /// Decode the next opcode, or `None` at end of stream.
    pub fn next_opcode(&mut self) -> Result<Option<Opcode>, FirmwareError> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }

        let op = self.buf.try_read_u8()?;
        let opcode = match op {
            META_DELAY => Opcode::Delay {
                ms: self.buf.try_read_u8()?,
            },
            META_BURST => {
                let n = self.buf.try_read_u8()?;
                if n < 2 {
                    return Err(FirmwareError::BadBurst(n));
                }
                let base = self.buf.try_read_u8()?;
                let count = n as usize - 1;
                if self.buf.remaining() < count {
                    return Err(FirmwareError::Truncated {
                        remaining: self.buf.remaining(),
                        required: count,
                    });
                }
                Opcode::Burst {
                    base,
                    values: self.buf.copy_to_bytes(count),
                }
            }
            META_ASCII => {
                let len = self.buf.try_read_u8()?;
                if self.buf.remaining() < len as usize {
                    return Err(FirmwareError::Truncated {
                        remaining: self.buf.remaining(),
                        required: len as usize,
                    });
                }
                self.buf.advance(len as usize);
                Opcode::SkipText { len }
            }
            reg => Opcode::Write {
                reg,
                value: self.buf.try_read_u8()?,
            },
        };
        Ok(Some(opcode))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(data: &'static [u8]) -> Vec<Opcode> {
        let mut reader = Reader::new(Bytes::from_static(data)).unwrap();
        let mut out = Vec::new();
        while let Some(op) = reader.next_opcode().unwrap() {
            out.push(op);
        }
        out
    }

    #[test]
    fn plain_writes() {
        assert_eq!(
            decode_all(&[0x03, 0x11, 0x28, 0x03]),
            vec![
                Opcode::Write {
                    reg: 0x03,
                    value: 0x11
                },
                Opcode::Write {
                    reg: 0x28,
                    value: 0x03
                },
            ]
        );
    }

    #[test]
    fn delay_then_write() {
        assert_eq!(
            decode_all(&[0xFE, 0x05, 0x10, 0x42]),
            vec![
                Opcode::Delay { ms: 5 },
                Opcode::Write {
                    reg: 0x10,
                    value: 0x42
                },
            ]
        );
    }

    #[test]
    fn burst_length_byte_counts_itself() {
        // length byte 0x04 means three values follow the base register
        assert_eq!(
            decode_all(&[0xFD, 0x04, 0x20, 0xAA, 0xBB, 0xCC]),
            vec![Opcode::Burst {
                base: 0x20,
                values: Bytes::from_static(&[0xAA, 0xBB, 0xCC]),
            }]
        );
    }

    #[test]
    fn ascii_annotation_is_skipped() {
        assert_eq!(
            decode_all(&[0xF0, 0x04, b'n', b'o', b't', b'e', 0x10, 0x42]),
            vec![
                Opcode::SkipText { len: 4 },
                Opcode::Write {
                    reg: 0x10,
                    value: 0x42
                },
            ]
        );
    }

    #[test]
    fn outer_framing_rejected() {
        assert_eq!(
            Reader::new(Bytes::from_static(&[0x10])).unwrap_err(),
            FirmwareError::TooShort { len: 1 }
        );
        assert_eq!(
            Reader::new(Bytes::from_static(&[0x10, 0x42, 0x11])).unwrap_err(),
            FirmwareError::OddLength { len: 3 }
        );
    }

    #[test]
    fn truncated_burst() {
        let mut reader = Reader::new(Bytes::from_static(&[0xFD, 0x05, 0x20, 0xAA])).unwrap();
        assert_eq!(
            reader.next_opcode().unwrap_err(),
            FirmwareError::Truncated {
                remaining: 1,
                required: 4
            }
        );
    }

    #[test]
    fn degenerate_burst_rejected() {
        let mut reader = Reader::new(Bytes::from_static(&[0xFD, 0x00])).unwrap();
        assert_eq!(
            reader.next_opcode().unwrap_err(),
            FirmwareError::BadBurst(0)
        );
    }
}
