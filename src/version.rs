/// ValueVersion is a monotonically increasing counter bumped whenever a
/// producer's value changes by identity. Recomputations that reproduce an
/// identical value do not bump it.
///
/// Versions are only comparable between observations of the same producer.
///
/// # Examples
///
/// ```
/// # use ripple::ValueVersion;
/// let seen = ValueVersion::INITIAL;
/// assert!(seen.bump() > seen);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueVersion(pub u64);

impl ValueVersion {
    /// The version a freshly created producer starts at.
    pub const INITIAL: Self = Self(1);

    /// The next version. Never wraps in practice; a `u64` outlives any graph.
    #[must_use]
    pub fn bump(self) -> Self {
        Self(self.0 + 1)
    }
}

/// TrackingVersion is a monotonically increasing counter bumped once per
/// recomputation of a consumer, immediately before its computation runs.
///
/// Every dependency edge records the consumer's tracking version at
/// registration time, which dates the edge: an edge recorded under an older
/// tracking version belongs to a previous computation whose topology may no
/// longer hold, and is pruned instead of trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackingVersion(pub u64);

impl TrackingVersion {
    /// The next tracking generation.
    #[must_use]
    pub fn bump(self) -> Self {
        Self(self.0 + 1)
    }
}
