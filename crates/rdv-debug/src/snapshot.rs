//! Suspend-count snapshots.

use std::fmt;

use indexmap::IndexMap;
use rdv_target::TargetControl;
use serde::ser::{Serialize, Serializer};
use smol_str::SmolStr;

use crate::error::ProbeError;

/// Suspend count of one thread at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub name: SmolStr,
    pub suspend_count: u32,
}

/// Thread name to snapshot, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendCountTable {
    threads: IndexMap<SmolStr, ThreadSnapshot>,
}

impl SuspendCountTable {
    /// Read the suspend count of every live thread. Never suspends or resumes.
    pub fn capture(target: &dyn TargetControl) -> Result<Self, ProbeError> {
        let mut table = Self::default();
        for thread in target.all_threads()? {
            let suspend_count = target.suspend_count(&thread)?;
            table.insert(thread.name, suspend_count);
        }
        Ok(table)
    }

    pub fn from_counts<'a>(counts: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let mut table = Self::default();
        for (name, count) in counts {
            table.insert(SmolStr::new(name), count);
        }
        table
    }

    fn insert(&mut self, name: SmolStr, suspend_count: u32) {
        self.threads.insert(
            name.clone(),
            ThreadSnapshot {
                name,
                suspend_count,
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ThreadSnapshot> {
        self.threads.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadSnapshot> {
        self.threads.values()
    }
}

impl Serialize for SuspendCountTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.threads
                .iter()
                .map(|(name, snapshot)| (name.as_str(), snapshot.suspend_count)),
        )
    }
}

impl fmt::Display for SuspendCountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, snapshot) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", snapshot.name, snapshot.suspend_count)?;
        }
        f.write_str("}")
    }
}
