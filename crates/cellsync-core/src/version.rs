//! Version comparison shared by every event-application path.
//!
//! Session responses arrive asynchronously and may refer to code or
//! output that has since been superseded. Every guard in the crate goes
//! through [`Freshness::of`] so they all agree on what "stale" means.

/// How an incoming version relates to the one currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Older than the current version; must be discarded.
    Stale,
    /// Same as the current version.
    Current,
    /// Newer than the current version.
    Ahead,
}

impl Freshness {
    /// Compare an incoming version against the current one.
    ///
    /// A missing current version means nothing has been recorded yet, so
    /// any incoming version is ahead of it.
    pub fn of(incoming: u64, current: Option<u64>) -> Self {
        match current {
            None => Freshness::Ahead,
            Some(current) if incoming < current => Freshness::Stale,
            Some(current) if incoming == current => Freshness::Current,
            Some(_) => Freshness::Ahead,
        }
    }

    pub fn is_stale(self) -> bool {
        self == Freshness::Stale
    }
}
