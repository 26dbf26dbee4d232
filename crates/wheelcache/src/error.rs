//! Error kinds surfaced by the façade.

use std::sync::Arc;

use thiserror::Error;

/// Malformed snapshot data.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// A record header or payload ended before the declared length.
    #[error("short read: expected {expected} bytes, record truncated")]
    ShortRead {
        /// Number of bytes the record header promised.
        expected: usize,
    },
    /// The `typeId` byte did not match any entry in the persisted-type table.
    #[error("unknown snapshot type id {0}")]
    UnknownTypeId(u8),
    /// `keySize` exceeded the 65,535-byte bound.
    #[error("key size {0} exceeds the 65535-byte bound")]
    KeyTooLarge(usize),
    /// The value payload exceeded the 524,288,000-byte bound.
    #[error("value size {0} exceeds the 524288000-byte bound")]
    ValueTooLarge(usize),
}

/// All errors the `wheelcache` façade can return.
///
/// There is no `NotFound` variant: an absent or expired key is the
/// unexceptional case for `Get`/`Load`, surfaced as `Option::None` or a
/// loader invocation rather than an error.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The loader passed to `Load`/`LoadWithEx` unwound via panic.
    #[error("loader panicked: {context}")]
    LoadFault {
        /// Best-effort description of the panic payload, for diagnosability.
        context: String,
    },
    /// The loader passed to `Load`/`LoadWithEx` returned `Err`; propagated
    /// verbatim to every caller sharing that single-flight call.
    #[error("loader failed: {0}")]
    LoadError(Arc<dyn std::error::Error + Send + Sync>),
    /// A snapshot record could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The snapshot reader/writer hit an I/O error.
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

impl CacheError {
    /// Wraps an arbitrary loader error, matching the `LoadError` kind.
    pub fn from_load_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::LoadError(Arc::new(err))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_load_error_wraps_an_arbitrary_std_error() {
        let err = CacheError::from_load_error(std::io::Error::other("boom"));
        assert!(matches!(err, CacheError::LoadError(_)));
    }

    #[test]
    fn io_error_converts_via_from() {
        let err: CacheError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, CacheError::Io(_)));
    }
}
