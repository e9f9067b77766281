//! The global variable table mirrored from the session.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cell::CellId;
use crate::version::Freshness;

/// Identifies the evaluation batch that produced a variable table.
///
/// Rendered as the composite token `lineId|cmdIndex`. `cmd_index` is the
/// session's running command counter, so it orders tokens from
/// different cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarVersion {
    pub line_id: CellId,
    pub cmd_index: u64,
}

impl VarVersion {
    pub fn new(line_id: CellId, cmd_index: u64) -> Self {
        Self { line_id, cmd_index }
    }
}

impl std::fmt::Display for VarVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.line_id.as_usize(), self.cmd_index)
    }
}

/// Error parsing a `lineId|cmdIndex` token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid variable version token: {0:?}")]
pub struct ParseVarVersionError(String);

impl FromStr for VarVersion {
    type Err = ParseVarVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, cmd) = s
            .split_once('|')
            .ok_or_else(|| ParseVarVersionError(s.to_string()))?;
        let line_id = line
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseVarVersionError(s.to_string()))?;
        let cmd_index = cmd
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseVarVersionError(s.to_string()))?;
        Ok(Self::new(CellId::new(line_id), cmd_index))
    }
}

impl Serialize for VarVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VarVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// What the session reports about one variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    /// Short printable rendering of the value.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// A variable bound by a cell, with the batch that bound it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarBinding {
    pub info: VarInfo,
    pub version: VarVersion,
}

/// Additive/subtractive update to the variable table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarDiff {
    #[serde(default)]
    pub adds: BTreeMap<String, VarInfo>,
    #[serde(default)]
    pub drops: Vec<String>,
}

/// Version-stamped mapping from variable name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VarTable {
    pub version: Option<VarVersion>,
    pub table: BTreeMap<String, VarInfo>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&VarInfo> {
        self.table.get(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Apply a diff produced at `version`.
    ///
    /// Returns `None` when the diff changes nothing: either it carries the
    /// token the table already has, or it is older than the table.
    pub fn apply(&self, diff: &VarDiff, version: VarVersion) -> Option<VarTable> {
        if let Some(current) = self.version {
            if current == version {
                return None;
            }
            if Freshness::of(version.cmd_index, Some(current.cmd_index)).is_stale() {
                return None;
            }
        }

        let mut table = self.table.clone();
        for name in &diff.drops {
            table.remove(name);
        }
        for (name, info) in &diff.adds {
            table.insert(name.clone(), info.clone());
        }

        Some(VarTable {
            version: Some(version),
            table,
        })
    }
}
