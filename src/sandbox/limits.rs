use std::time::Duration;

use crate::config::Settings;
use crate::models::SecurityLevel;

/// Ceilings enforced on a sandboxed execution.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub wall_clock: Duration,
    pub memory_bytes: u64,
    pub cpu_seconds: u64,
    pub max_open_files: u64,
    pub max_processes: u64,
    /// Honored by backends that control network namespaces; the plain
    /// process backend delegates network policy to the platform layer.
    pub allow_network: bool,
}

impl ResourceLimits {
    /// Derive ceilings for a request level from the configured base values.
    /// Stricter levels get tighter ceilings.
    pub fn for_level(level: SecurityLevel, settings: &Settings) -> Self {
        let divisor = match level {
            SecurityLevel::Low | SecurityLevel::Medium => 1,
            SecurityLevel::High => 2,
            SecurityLevel::Critical => 4,
        };
        Self {
            wall_clock: Duration::from_secs((settings.timeout_secs / divisor).max(1)),
            memory_bytes: (settings.memory_mb / divisor).max(16) * 1024 * 1024,
            cpu_seconds: (settings.timeout_secs / divisor).max(1),
            max_open_files: (settings.max_open_files / divisor).max(8),
            max_processes: (settings.max_processes / divisor).max(4),
            allow_network: settings.network_allowed_levels.contains(&level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stricter_levels_get_tighter_ceilings() {
        let settings = Settings::default();
        let low = ResourceLimits::for_level(SecurityLevel::Low, &settings);
        let high = ResourceLimits::for_level(SecurityLevel::High, &settings);
        let critical = ResourceLimits::for_level(SecurityLevel::Critical, &settings);

        assert!(low.wall_clock >= high.wall_clock);
        assert!(high.wall_clock >= critical.wall_clock);
        assert!(low.memory_bytes >= critical.memory_bytes);
        assert!(low.max_processes >= critical.max_processes);
    }

    #[test]
    fn test_network_off_by_default() {
        let settings = Settings::default();
        for level in [
            SecurityLevel::Low,
            SecurityLevel::Medium,
            SecurityLevel::High,
            SecurityLevel::Critical,
        ] {
            assert!(!ResourceLimits::for_level(level, &settings).allow_network);
        }
    }

    #[test]
    fn test_network_enabled_per_level() {
        let settings = Settings {
            network_allowed_levels: vec![SecurityLevel::Low],
            ..Default::default()
        };
        assert!(ResourceLimits::for_level(SecurityLevel::Low, &settings).allow_network);
        assert!(!ResourceLimits::for_level(SecurityLevel::High, &settings).allow_network);
    }
}
