//! Default machine settings, read once from the environment.
//!
//! Every [`Machine`](crate::machine::Machine) copies these on construction and
//! can override them afterwards, so two machines never share settings.
use std::{str::FromStr, sync::LazyLock};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Print one trace line per executed instruction.
    pub debug: bool,
    /// Maximum number of values on the stack.
    pub max_stack_size: usize,
    /// Maximum number of instructions executed by one `run` or `resume`.
    pub cycle_limit: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self { debug: false, max_stack_size: usize::MAX, cycle_limit: None }
    }
}

fn parse_env_opt<T>(key: &str) -> Option<T>
where
    T: FromStr + 'static, <T as FromStr>::Err: std::fmt::Display
{
    if let Ok(mut val) = std::env::var(key) {
        if std::any::TypeId::of::<T>() == std::any::TypeId::of::<bool>() {
            val = val.to_lowercase();
            if val == "1" || val == "yes" || val == "on" {
                val = "true".to_string();
            } else if val == "0" || val == "no" || val == "off" {
                val = "false".to_string();
            }
        }
        match val.parse::<T>() {
            Ok(v) => Some(v),
            Err(err) => {
                if !val.is_empty() {
                    warn!(key, value = %val, error = %err, "ignoring malformed environment variable");
                }
                None
            }
        }
    } else {
        None
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + 'static, <T as FromStr>::Err: std::fmt::Display
{
    parse_env_opt(key).unwrap_or(default)
}

fn create_config() -> MachineConfig {
    let defaults = MachineConfig::default();
    MachineConfig {
        debug: parse_env("BRUTUS_DEBUG", defaults.debug),
        max_stack_size: parse_env("BRUTUS_MAX_STACK_SIZE", defaults.max_stack_size),
        // 0 means no limit
        cycle_limit: parse_env_opt::<u64>("BRUTUS_CYCLE_LIMIT").filter(|&limit| limit > 0),
    }
}

static CELL: LazyLock<MachineConfig> = LazyLock::new(create_config);

pub fn get_config() -> &'static MachineConfig {
    &CELL
}
