use crate::error::{LispError, LispResult};
use crate::value::ValueRef;

/// Runtime bounds. Every container is sized from these once, at startup, and
/// never grows afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of value slots in the arena, reserved slots included.
    pub arena_capacity: usize,
    /// Number of distinct symbol names that can be interned.
    pub max_symbols: usize,
    /// Longest symbol name, in bytes.
    pub max_symbol_len: usize,
    /// Number of native procedures and macros the registry accepts.
    pub max_natives: usize,
    /// Arena usage, in percent, above which a finished collection reports
    /// out-of-memory instead of returning.
    pub max_usage_percent: u8,
    /// Deepest permitted nesting of `evaluate` calls.
    pub max_eval_depth: usize,
    /// Log every evaluation step, as `(pragma)` does.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            arena_capacity: 100_000,
            max_symbols: 1024,
            max_symbol_len: 15,
            max_natives: 100,
            max_usage_percent: 60,
            max_eval_depth: 2000,
            trace: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> LispResult<()> {
        if self.arena_capacity <= ValueRef::RESERVED {
            return Err(LispError::InvalidConfig(format!(
                "arena capacity must exceed the {} reserved slots",
                ValueRef::RESERVED
            )));
        }
        if self.arena_capacity > u32::MAX as usize {
            return Err(LispError::InvalidConfig(
                "arena capacity does not fit a slot index".into(),
            ));
        }
        if self.max_usage_percent == 0 || self.max_usage_percent > 100 {
            return Err(LispError::InvalidConfig(format!(
                "max usage must be within 1..=100, got {}",
                self.max_usage_percent
            )));
        }
        if self.max_symbols == 0 || self.max_symbol_len == 0 {
            return Err(LispError::InvalidConfig(
                "symbol table needs room for at least one name".into(),
            ));
        }
        if self.max_eval_depth == 0 {
            return Err(LispError::InvalidConfig("evaluation depth must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_arena_without_room_past_reserved_slots() {
        let config = Config { arena_capacity: 3, ..Config::default() };
        assert!(matches!(config.validate(), Err(LispError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_usage_threshold() {
        for pct in [0, 101] {
            let config = Config { max_usage_percent: pct, ..Config::default() };
            assert!(config.validate().is_err(), "{pct}% should be rejected");
        }
    }
}
