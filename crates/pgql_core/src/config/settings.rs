use std::collections::HashMap;
use std::sync::LazyLock;

use pgql_error::{DbError, Result};

use super::{GroupingConfig, GroupingStrategy, StorageMode};

const MIN_THREADS: usize = 1;
const MAX_THREADS: usize = 512;

impl GroupingConfig {
    /// Set a named setting from its string form.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let func = lookup(name)?;
        (func.set)(value, self)
    }

    /// Get a named setting as a string.
    pub fn get(&self, name: &str) -> Result<String> {
        let func = lookup(name)?;
        Ok((func.get)(self))
    }

    /// Reset a named setting to its default.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = lookup(name)?;
        let def_conf = GroupingConfig::default();
        let value = (func.get)(&def_conf);
        (func.set)(&value, self)
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

fn lookup(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS
        .get(name)
        .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))
}

struct SettingFunctions {
    description: &'static str,
    set: fn(value: &str, conf: &mut GroupingConfig) -> Result<()>,
    get: fn(conf: &GroupingConfig) -> String,
}

impl SettingFunctions {
    const fn new<S: GroupingSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_str as _,
            get: S::get_as_string as _,
        }
    }
}

fn insert_setting<S: GroupingSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<Threads>(&mut map);
    insert_setting::<Strategy>(&mut map);
    insert_setting::<Storage>(&mut map);

    map
});

pub trait GroupingSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_str(value: &str, conf: &mut GroupingConfig) -> Result<()>;
    fn get_as_string(conf: &GroupingConfig) -> String;
}

pub struct Threads;

impl Threads {
    pub fn validate_value(val: usize) -> Result<()> {
        if val < MIN_THREADS {
            return Err(DbError::new(format!(
                "Thread count cannot be less than {MIN_THREADS}"
            )));
        }

        if val > MAX_THREADS {
            return Err(DbError::new(format!(
                "Thread count cannot be greater than {MAX_THREADS}"
            )));
        }

        Ok(())
    }
}

impl GroupingSetting for Threads {
    const NAME: &'static str = "threads";
    const DESCRIPTION: &'static str = "Number of worker threads to group with";

    fn set_from_str(value: &str, conf: &mut GroupingConfig) -> Result<()> {
        let val: usize = value.trim().parse().map_err(|e| {
            DbError::with_source("Failed to parse thread count", Box::new(e))
                .with_field("value", value.to_string())
        })?;
        Self::validate_value(val)?;

        conf.threads = val;
        Ok(())
    }

    fn get_as_string(conf: &GroupingConfig) -> String {
        conf.threads.to_string()
    }
}

pub struct Strategy;

impl GroupingSetting for Strategy {
    const NAME: &'static str = "strategy";
    const DESCRIPTION: &'static str = "Grouping strategy (local_merge, local_global_merge, global_merge)";

    fn set_from_str(value: &str, conf: &mut GroupingConfig) -> Result<()> {
        conf.strategy = value.trim().parse::<GroupingStrategy>()?;
        Ok(())
    }

    fn get_as_string(conf: &GroupingConfig) -> String {
        conf.strategy.to_string()
    }
}

pub struct Storage;

impl GroupingSetting for Storage {
    const NAME: &'static str = "storage";
    const DESCRIPTION: &'static str = "Aggregate state storage for local grouping (bucket, list, array)";

    fn set_from_str(value: &str, conf: &mut GroupingConfig) -> Result<()> {
        conf.storage = value.trim().parse::<StorageMode>()?;
        Ok(())
    }

    fn get_as_string(conf: &GroupingConfig) -> String {
        conf.storage.to_string()
    }
}
