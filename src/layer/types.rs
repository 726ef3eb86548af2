use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const S_IFMT: u32 = libc::S_IFMT as u32;
const S_IFDIR: u32 = libc::S_IFDIR as u32;
const S_IFREG: u32 = libc::S_IFREG as u32;
const PERM_MASK: u32 = 0o7777;

/// File type and permission bits of an inode, laid out like `st_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(u32);

impl Mode {
    pub const fn from_bits(bits: u32) -> Self {
        Mode(bits)
    }

    pub fn directory(perm: u32) -> Self {
        Mode(S_IFDIR | (perm & PERM_MASK))
    }

    pub fn regular(perm: u32) -> Self {
        Mode(S_IFREG | (perm & PERM_MASK))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn permissions(self) -> u32 {
        self.0 & PERM_MASK
    }

    pub fn is_dir(self) -> bool {
        self.0 & S_IFMT == S_IFDIR
    }

    pub fn is_regular(self) -> bool {
        self.0 & S_IFMT == S_IFREG
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Timestamps {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// What `remove_layer` does to the inodes of the layer it unregisters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemovePolicy {
    /// Leave inodes untouched; the layer is torn down by a sweep once no
    /// child layer depends on it and none of its inodes is referenced.
    #[default]
    Defer,
    /// Mark every inode deleted immediately; sweeps reclaim them as their
    /// references drain.
    Cascade,
}

impl fmt::Display for RemovePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovePolicy::Defer => write!(f, "defer"),
            RemovePolicy::Cascade => write!(f, "cascade"),
        }
    }
}

impl std::str::FromStr for RemovePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "defer" => Ok(RemovePolicy::Defer),
            "cascade" => Ok(RemovePolicy::Cascade),
            _ => Err(format!(
                "Invalid remove_policy value '{}'. Must be one of: defer, cascade",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "A"),
            ChangeKind::Modified => write!(f, "M"),
            ChangeKind::Removed => write!(f, "D"),
        }
    }
}

/// One entry of a layer changes listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
}

/// Outcome of a single reclamation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub inspected: usize,
    pub reclaimed: usize,
    /// Removed layers still awaiting teardown when the sweep finished.
    pub layers_retired: usize,
    pub layers_forgotten: usize,
}
