use bytes::Buf;
#[cfg(feature = "debug")]
use thiserror::Error;

#[cfg_attr(feature = "debug", derive(Debug, Error))]
#[derive(Clone, PartialEq, Eq)]
pub enum TryBufError {
    #[cfg_attr(
        feature = "debug",
        error("invalid read length, remaining: {remaining}, required: {required}")
    )]
    InvalidLength { remaining: usize, required: usize },
}

/// Checked counterpart of the `bytes::Buf` byte getter used by the
/// microprogram decoder. Named apart from the `Buf` surface so newer
/// `bytes` releases growing their own checked getters cannot make call
/// sites ambiguous.
pub trait TryBuf {
    fn try_read_u8(&mut self) -> Result<u8, TryBufError>;
}

impl<T> TryBuf for T
where
    T: Buf,
{
    fn try_read_u8(&mut self) -> Result<u8, TryBufError> {
        if self.remaining() < 1 {
            Err(TryBufError::InvalidLength {
                remaining: self.remaining(),
                required: 1,
            })
        } else {
            Ok(self.get_u8())
        }
    }
}
