//! # Configuration Validation
//!
//! Provides validation for fixture configuration using the `validator` crate.

use crate::config::FixtureConfig;
use validator::Validate;

/// Validate fixture configuration.
///
/// ## Validation Rules
/// - `image`: 1-255 characters
/// - `tag`: 1-128 characters
/// - `exposed_ports`: 1-16 entries
/// - `primary_port`: 1-65535 and listed in `exposed_ports`
/// - `credentials.username`/`credentials.database`: 1-63 characters
/// - `credentials.password`: 1+ characters
/// - `startup_timeout_ms`: 100-600000
/// - `poll_interval_ms`: 10-10000
pub fn validate(config: &FixtureConfig) -> Result<(), validator::ValidationErrors> {
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate(&FixtureConfig::default()).is_ok());
        assert!(validate(&FixtureConfig::generic("redis", "7", 6379)).is_ok());
    }

    #[test]
    fn test_validate_empty_image() {
        let mut config = FixtureConfig::default();
        config.image = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_primary_port_zero() {
        let mut config = FixtureConfig::default();
        config.primary_port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_primary_port_not_exposed() {
        let mut config = FixtureConfig::default();
        config.primary_port = 6543;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_no_exposed_ports() {
        let mut config = FixtureConfig::default();
        config.exposed_ports.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_startup_timeout_out_of_range() {
        let mut config = FixtureConfig::default();
        config.startup_timeout_ms = 50;
        assert!(validate(&config).is_err());

        config.startup_timeout_ms = 600_001;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_poll_interval_out_of_range() {
        let mut config = FixtureConfig::default();
        config.poll_interval_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_empty_password() {
        let mut config = FixtureConfig::default();
        config.credentials.password = "".to_string();
        assert!(validate(&config).is_err());
    }
}
