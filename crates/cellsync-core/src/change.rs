//! Change sets: a text edit described against the document it replaces.
//!
//! Positions of cells that an edit does not touch are carried forward
//! with [`ChangeSet::map_pos`] instead of being rediscovered, which is
//! what lets pure position shifts be recognized as such.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which side of an insertion a boundary position sticks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    /// Stay before text inserted at the position.
    Before,
    /// Move after text inserted at the position.
    After,
}

/// One replacement of `from..to` in the old document with `insert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub insert: String,
}

impl Change {
    pub fn new(from: usize, to: usize, insert: impl Into<String>) -> Self {
        Self {
            from,
            to,
            insert: insert.into(),
        }
    }

    fn is_noop(&self) -> bool {
        self.from == self.to && self.insert.is_empty()
    }

    fn delta(&self) -> isize {
        self.insert.len() as isize - (self.to - self.from) as isize
    }
}

/// An ordered set of non-overlapping changes against a document of `old_len` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
    old_len: usize,
}

impl ChangeSet {
    /// Build a change set, validating ranges against the old document length.
    pub fn new(mut changes: Vec<Change>, old_len: usize) -> Result<Self> {
        changes.sort_by_key(|c| (c.from, c.to));

        let mut last_end = 0;
        for change in &changes {
            if change.from > change.to {
                return Err(Error::invalid_change(format!(
                    "change starts at {} but ends at {}",
                    change.from, change.to
                )));
            }
            if change.to > old_len {
                return Err(Error::invalid_change(format!(
                    "change ends at {} past document length {}",
                    change.to, old_len
                )));
            }
            if change.from < last_end {
                return Err(Error::invalid_change(format!(
                    "change at {} overlaps a previous change ending at {}",
                    change.from, last_end
                )));
            }
            last_end = change.to;
        }

        Ok(Self { changes, old_len })
    }

    /// A change set that leaves the document untouched.
    pub fn empty(old_len: usize) -> Self {
        Self {
            changes: Vec::new(),
            old_len,
        }
    }

    pub fn insert(pos: usize, text: impl Into<String>, old_len: usize) -> Result<Self> {
        Self::new(vec![Change::new(pos, pos, text)], old_len)
    }

    pub fn replace(from: usize, to: usize, text: impl Into<String>, old_len: usize) -> Result<Self> {
        Self::new(vec![Change::new(from, to, text)], old_len)
    }

    pub fn delete(from: usize, to: usize, old_len: usize) -> Result<Self> {
        Self::new(vec![Change::new(from, to, "")], old_len)
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn old_len(&self) -> usize {
        self.old_len
    }

    pub fn new_len(&self) -> usize {
        let delta: isize = self.changes.iter().map(Change::delta).sum();
        (self.old_len as isize + delta) as usize
    }

    /// Whether applying the set would leave any document unchanged.
    pub fn is_empty(&self) -> bool {
        self.changes.iter().all(Change::is_noop)
    }

    /// Apply the changes to `doc`, which must be the document they were made against.
    pub fn apply(&self, doc: &str) -> Result<String> {
        if doc.len() != self.old_len {
            return Err(Error::invalid_change(format!(
                "change set expects a document of {} bytes, got {}",
                self.old_len,
                doc.len()
            )));
        }

        let mut out = String::with_capacity(self.new_len());
        let mut cursor = 0;
        for change in &self.changes {
            if !doc.is_char_boundary(change.from) || !doc.is_char_boundary(change.to) {
                return Err(Error::invalid_change(format!(
                    "change {}..{} splits a character",
                    change.from, change.to
                )));
            }
            out.push_str(&doc[cursor..change.from]);
            out.push_str(&change.insert);
            cursor = change.to;
        }
        out.push_str(&doc[cursor..]);

        Ok(out)
    }

    /// Map a position in the old document to the new one.
    ///
    /// A position strictly inside a replaced range collapses onto the start
    /// (`Before`) or end (`After`) of the inserted text. The start of a
    /// replaced range stays at its start and the end stays at the end of
    /// the insertion, whatever `assoc` says.
    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> usize {
        let mut delta: isize = 0;

        for change in &self.changes {
            if pos < change.from {
                break;
            }
            if pos > change.to {
                delta += change.delta();
                continue;
            }

            let start = (change.from as isize + delta) as usize;
            let end = start + change.insert.len();

            if change.from == change.to || (pos != change.from && pos != change.to) {
                return match assoc {
                    Assoc::Before => start,
                    Assoc::After => end,
                };
            }
            return if pos == change.from { start } else { end };
        }

        (pos as isize + delta) as usize
    }

    /// Whether any change edits or inserts text within `from..=to`.
    pub fn touches(&self, from: usize, to: usize) -> bool {
        self.changes
            .iter()
            .filter(|c| !c.is_noop())
            .any(|c| c.from <= to && c.to >= from)
    }
}
