//! Application identifiers
//!
//! An [`Aid`] is a shared, reference counted byte string naming an application on the card.
//! Each owned `Aid` value is one reference: [`Aid::acquire`] adds one, [`Aid::release`]
//! consumes one, and the storage is freed when the last reference goes away. Channels keep
//! their own reference to the AID they selected, so a caller may release theirs as soon as
//! the channel is open.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

/// Shortest AID accepted (registered application provider identifier)
pub const MIN_AID_LENGTH: usize = 5;

/// Longest AID accepted (RID plus an 11 byte proprietary extension)
pub const MAX_AID_LENGTH: usize = 16;

/// Reference counted application identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Aid {
    bytes: Arc<[u8]>,
}

impl Aid {
    /// Create an AID from its raw bytes, with a reference count of one
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !(MIN_AID_LENGTH..=MAX_AID_LENGTH).contains(&bytes.len()) {
            return Err(Error::InvalidLength {
                length: bytes.len(),
                min: MIN_AID_LENGTH,
                max: MAX_AID_LENGTH,
            });
        }
        Ok(Self {
            bytes: Arc::from(bytes),
        })
    }

    /// Create an AID from its hexadecimal name, e.g. `A000000151000000`
    ///
    /// Whitespace between bytes is ignored.
    pub fn from_name(name: &str) -> Result<Self> {
        let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes =
            hex::decode(compact).map_err(|_| Error::BadParameters("AID name is not valid hex"))?;
        Self::from_bytes(&bytes)
    }

    /// Take another reference to the same identifier
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    /// Give up this reference and return how many remain
    ///
    /// The storage is freed when the returned count is zero. Under concurrent use the count
    /// is a snapshot.
    pub fn release(self) -> usize {
        let remaining = Arc::strong_count(&self.bytes) - 1;
        drop(self);
        remaining
    }

    /// Number of live references to this identifier
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }

    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Identifier length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; AIDs are never empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for Aid {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl FromStr for Aid {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::from_name(name)
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.bytes))
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({self})")
    }
}
