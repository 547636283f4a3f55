use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::borrow::Borrow;
use std::fmt;

new_key_type! {
    /// Arena key for a node in the connectivity graph. Only valid for the
    /// graph that issued it; a rebuilt graph issues fresh keys.
    pub struct NodeKey;
}

/// Identifies a device in a layout. Stable across layout swaps, so it is the
/// handle hosts and tokens use to refer to devices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifies a token. Allocated in increasing order by a [`TokenIdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// Hands out monotonically increasing token ids, starting at 1.
///
/// Each engine owns its own generator, so two engines in the same process
/// never share a counter. [`reset`](Self::reset) restarts the sequence.
#[derive(Debug, Clone, Default)]
pub struct TokenIdGenerator {
    last: u64,
}

impl TokenIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> TokenId {
        self.last += 1;
        TokenId(self.last)
    }

    /// The most recently allocated id, if any.
    pub fn last(&self) -> Option<TokenId> {
        (self.last > 0).then_some(TokenId(self.last))
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}
