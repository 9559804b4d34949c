//! Timing configuration, overridable by environment variables for slower CI machines.

use std::env;
use std::time::Duration;

const DEFAULT_ELECTION_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAINTENANCE_TICK_MS: u64 = 200;

/// The node's timing knobs. `heartbeat_interval` is derived from `election_timeout` (see
/// [`raft::node::Config::heartbeat_interval`]) and is not independently configurable.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub election_timeout: Duration,
    pub maintenance_tick: Duration,
}

impl Config {
    /// Reads `RAFT_ELECTION_TIMEOUT_MS` / `RAFT_MAINTENANCE_TICK_MS`, falling back to the
    /// documented defaults (2s / 200ms) for any variable that is unset or not a valid `u64`.
    pub fn from_env() -> Self {
        Self {
            election_timeout: Duration::from_millis(read_ms(
                "RAFT_ELECTION_TIMEOUT_MS",
                DEFAULT_ELECTION_TIMEOUT_MS,
            )),
            maintenance_tick: Duration::from_millis(read_ms(
                "RAFT_MAINTENANCE_TICK_MS",
                DEFAULT_MAINTENANCE_TICK_MS,
            )),
        }
    }

    pub fn node_config(&self) -> raft::node::Config {
        raft::node::Config { election_timeout: self.election_timeout }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            election_timeout: Duration::from_millis(DEFAULT_ELECTION_TIMEOUT_MS),
            maintenance_tick: Duration::from_millis(DEFAULT_MAINTENANCE_TICK_MS),
        }
    }
}

fn read_ms(var: &str, default: u64) -> u64 {
    env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    // Guards against concurrent env mutation across tests in this module; the process-wide
    // env is otherwise shared mutable state between threads in the test binary.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn falls_back_to_documented_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("RAFT_ELECTION_TIMEOUT_MS");
        env::remove_var("RAFT_MAINTENANCE_TICK_MS");
        let config = Config::from_env();
        assert_eq!(config.election_timeout, Duration::from_millis(2_000));
        assert_eq!(config.maintenance_tick, Duration::from_millis(200));
    }

    #[rstest]
    #[case::override_both("500", "50", 500, 50)]
    #[case::override_election_only("750", "not-a-number", 750, 200)]
    #[case::override_neither("not-a-number", "not-a-number", 2_000, 200)]
    fn env_overrides_apply_per_variable_and_fall_back_independently(
        #[case] election_ms: &str,
        #[case] tick_ms: &str,
        #[case] expected_election_ms: u64,
        #[case] expected_tick_ms: u64,
    ) {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RAFT_ELECTION_TIMEOUT_MS", election_ms);
        env::set_var("RAFT_MAINTENANCE_TICK_MS", tick_ms);
        let config = Config::from_env();
        assert_eq!(config.election_timeout, Duration::from_millis(expected_election_ms));
        assert_eq!(config.maintenance_tick, Duration::from_millis(expected_tick_ms));
        env::remove_var("RAFT_ELECTION_TIMEOUT_MS");
        env::remove_var("RAFT_MAINTENANCE_TICK_MS");
    }
}
