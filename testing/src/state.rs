use std::fmt;

/// Lifecycle state of a fixture instance.
///
/// ```text
/// Pending --start ok--> Running
/// Pending --start fail--> Stopped
/// Running --inject_partition--> Partitioned --after duration--> Running
/// Running --restart--> Restarting --ok--> Running
/// Running/Partitioned/Restarting --release--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    Pending,
    Running,
    Partitioned,
    Restarting,
    Stopped
}

impl FixtureState {
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    /// States a fault-injection transition may leave from.
    pub fn accepts_fault(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Partitioned => "Partitioned",
            Self::Restarting => "Restarting",
            Self::Stopped => "Stopped"
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_running_accepts_faults() {
        assert!(FixtureState::Running.accepts_fault());
        for state in [
            FixtureState::Pending,
            FixtureState::Partitioned,
            FixtureState::Restarting,
            FixtureState::Stopped
        ] {
            assert!(!state.accepts_fault(), "{state} should reject faults");
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        assert!(FixtureState::Stopped.is_terminal());
        assert!(!FixtureState::Restarting.is_terminal());
    }
}
