//! Event stream identification and revision types.
//!
//! This module defines strong types for event stream identification (`StreamId`)
//! and optimistic concurrency control (`Revision`) used in event sourcing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for an event stream (aggregate instance).
///
/// A stream ID uniquely identifies a single aggregate instance in the event store.
/// For example:
/// - `"gathering-12345"`
/// - `"gathering-uuid-here"`
///
/// # Design
///
/// `StreamId` is a newtype wrapper around `String` that provides:
/// - Type safety (can't accidentally use a regular string)
/// - Clear intent in function signatures
/// - Serialization support for storage
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Use `FromStr` when parsing external/user input. Use `new()` or `From` when
/// constructing stream IDs from application-controlled data
///
/// # Examples
///
/// ```
/// use gatherly_core::stream::StreamId;
///
/// let stream_id = StreamId::new("gathering-12345");
/// assert_eq!(stream_id.as_str(), "gathering-12345");
///
/// let parsed: StreamId = "gathering-abc".parse().unwrap();
/// assert_eq!(parsed, StreamId::new("gathering-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use gatherly_core::stream::StreamId;
    ///
    /// let id = StreamId::new("gathering-123");
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `StreamId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stream revision number for optimistic concurrency control.
///
/// Revisions start at 0 and advance by 1 for each event appended to a stream.
/// The revision is used to detect concurrent modifications:
///
/// - When appending events, you specify the expected revision
/// - If the stream's current revision doesn't match, the append fails
/// - This prevents lost updates in concurrent scenarios
///
/// The revision doubles as the roster's change marker: every admission or
/// departure on a gathering advances its stream revision, so observers can
/// order roster snapshots without comparing their contents.
///
/// # Design
///
/// `Revision` is a newtype wrapper around `u64` that provides:
/// - Type safety (can't accidentally use a plain integer)
/// - Clear intent in function signatures
/// - Arithmetic operations (+1, etc.)
///
/// # Examples
///
/// ```
/// use gatherly_core::stream::Revision;
///
/// let r0 = Revision::new(0);
/// let r1 = r0.next();
/// assert_eq!(r1, Revision::new(1));
///
/// let r5 = Revision::new(5);
/// assert_eq!(r5.value(), 5);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// The initial revision (0) for a new event stream.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Revision` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the revision number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next revision (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// This operation uses plain arithmetic. Reaching `u64::MAX` events on a
    /// single stream is not a realistic concern.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the initial revision (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Revision> for u64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

impl std::ops::Add<u64> for Revision {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub<u64> for Revision {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}
