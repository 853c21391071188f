pub mod settings;

use std::fmt;
use std::str::FromStr;

use pgql_error::{DbError, Result};

/// Algorithm used to group rows and merge partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupingStrategy {
    /// Thread-local grouping followed by a binary-tree merge of the local
    /// dictionaries.
    LocalMerge,
    /// Thread-local grouping followed by each worker merging its groups into a
    /// shared dictionary.
    LocalGlobalMerge,
    /// Every worker groups directly into a shared dictionary.
    GlobalMerge,
}

impl GroupingStrategy {
    pub const ALL: [GroupingStrategy; 3] = [
        GroupingStrategy::LocalMerge,
        GroupingStrategy::LocalGlobalMerge,
        GroupingStrategy::GlobalMerge,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LocalMerge => "local_merge",
            Self::LocalGlobalMerge => "local_global_merge",
            Self::GlobalMerge => "global_merge",
        }
    }
}

impl fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GroupingStrategy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| DbError::new(format!("Unknown grouping strategy '{s}'")))
    }
}

/// Representation of per-group aggregate state during the local phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMode {
    Bucket,
    List,
    Array,
}

impl StorageMode {
    pub const ALL: [StorageMode; 3] = [StorageMode::Bucket, StorageMode::List, StorageMode::Array];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::List => "list",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| DbError::new(format!("Unknown storage mode '{s}'")))
    }
}

/// Configuration for a single grouping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingConfig {
    /// Number of worker threads. Each worker gets a contiguous share of the
    /// rows.
    pub threads: usize,
    pub strategy: GroupingStrategy,
    /// Ignored by `GlobalMerge`, which always aggregates into buckets.
    pub storage: StorageMode,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            threads: num_cpus::get(),
            strategy: GroupingStrategy::LocalMerge,
            storage: StorageMode::List,
        }
    }
}

impl GroupingConfig {
    pub fn new(threads: usize, strategy: GroupingStrategy, storage: StorageMode) -> Self {
        GroupingConfig {
            threads,
            strategy,
            storage,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(DbError::new("Thread count must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_display_roundtrip() {
        for strategy in GroupingStrategy::ALL {
            assert_eq!(strategy, strategy.to_string().parse().unwrap());
        }
        for mode in StorageMode::ALL {
            assert_eq!(mode, mode.to_string().parse().unwrap());
        }
    }

    #[test]
    fn parse_unknown() {
        "tree".parse::<GroupingStrategy>().unwrap_err();
        "LIST".parse::<StorageMode>().unwrap_err();
    }

    #[test]
    fn default_uses_all_cpus() {
        let conf = GroupingConfig::default();
        assert_eq!(num_cpus::get(), conf.threads);
        assert_eq!(GroupingStrategy::LocalMerge, conf.strategy);
        assert_eq!(StorageMode::List, conf.storage);
        conf.validate().unwrap();
    }

    #[test]
    fn zero_threads_invalid() {
        GroupingConfig::new(0, GroupingStrategy::GlobalMerge, StorageMode::Bucket)
            .validate()
            .unwrap_err();
    }
}
