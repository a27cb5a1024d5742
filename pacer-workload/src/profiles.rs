//! Simulation profiles.
//!
//! Named workload shapes for the simulator, plus TOML loading for custom
//! ones.
//!
//! # Example
//!
//! ```
//! use pacer_workload::profiles::{load_profile, SimulationProfile};
//!
//! let profile = load_profile("nack-storm").unwrap();
//! assert!(profile.workload.mix.nack > profile.workload.mix.ack);
//!
//! let custom = SimulationProfile::from_toml(
//!     r#"
//!     name = "tiny"
//!     [workload]
//!     operations = 50
//!     throttle = 2
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(custom.workload.operations, 50);
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workload::{OperationMix, SizeDistribution, WorkloadConfig};

/// A named simulation profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    /// Profile name.
    pub name: String,
    /// What this profile exercises.
    pub description: String,
    /// Workload shape. The seed is normally overridden per run.
    pub workload: WorkloadConfig,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "Default simulation profile".to_string(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl SimulationProfile {
    /// Load a profile from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ProfileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse a profile from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml(toml: &str) -> Result<Self, ProfileError> {
        toml::from_str(toml).map_err(|e| ProfileError::Parse {
            message: e.to_string(),
        })
    }

    /// Serialize the profile to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Error type for profile operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// I/O error reading profile file.
    #[error("failed to read profile from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Parse error in TOML.
    #[error("failed to parse profile: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
    /// Profile not found.
    #[error("profile not found: {name}")]
    NotFound {
        /// Profile name.
        name: String,
    },
}

fn profile(name: &str, description: &str, workload: WorkloadConfig) -> SimulationProfile {
    SimulationProfile {
        name: name.to_string(),
        description: description.to_string(),
        workload,
    }
}

/// Built-in simulation profiles.
#[must_use]
pub fn builtin_profiles() -> HashMap<&'static str, SimulationProfile> {
    let base = WorkloadConfig::default();

    HashMap::from([
        (
            "baseline",
            profile("baseline", "Balanced publish and confirm traffic", base.clone()),
        ),
        (
            "burst",
            profile(
                "burst",
                "Publishes far outpace confirms; the queue grows deep",
                WorkloadConfig {
                    operations: 5_000,
                    throttle: 16,
                    mix: OperationMix {
                        publish: 80,
                        ack: 15,
                        nack: 1,
                        set_throttle: 1,
                        flush: 2,
                        channel_error: 1,
                    },
                    multiple_ratio: 0.5,
                    ..base.clone()
                },
            ),
        ),
        (
            "nack-storm",
            profile(
                "nack-storm",
                "Broker rejects more than it accepts",
                WorkloadConfig {
                    mix: OperationMix {
                        publish: 45,
                        ack: 15,
                        nack: 35,
                        set_throttle: 2,
                        flush: 2,
                        channel_error: 1,
                    },
                    ..base.clone()
                },
            ),
        ),
        (
            "retune",
            profile(
                "retune",
                "Throttle changes constantly, including to zero",
                WorkloadConfig {
                    throttle: 0,
                    max_throttle: 6,
                    mix: OperationMix {
                        publish: 40,
                        ack: 30,
                        nack: 5,
                        set_throttle: 20,
                        flush: 5,
                        channel_error: 0,
                    },
                    ..base.clone()
                },
            ),
        ),
        (
            "flaky-channel",
            profile(
                "flaky-channel",
                "Channel refuses a share of publishes",
                WorkloadConfig {
                    publish_fail_rate: 0.1,
                    message_size: SizeDistribution::Fixed { size: 64 },
                    ..base.clone()
                },
            ),
        ),
        (
            "skewed",
            profile(
                "skewed",
                "Channel tags run ahead of the publisher's sequence ids",
                WorkloadConfig {
                    tag_skew: 100,
                    ..base.clone()
                },
            ),
        ),
        (
            "early-close",
            profile(
                "early-close",
                "Close is requested a fifth of the way in",
                WorkloadConfig {
                    close_after: Some(base.operations / 5),
                    ..base
                },
            ),
        ),
    ])
}

/// Load a built-in profile by name.
///
/// # Errors
///
/// Returns an error if the profile name is not found.
pub fn load_profile(name: &str) -> Result<SimulationProfile, ProfileError> {
    builtin_profiles()
        .remove(name)
        .ok_or_else(|| ProfileError::NotFound {
            name: name.to_string(),
        })
}

/// List all available built-in profile names.
#[must_use]
pub fn list_profiles() -> Vec<&'static str> {
    let mut names: Vec<_> = builtin_profiles().keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_validate() {
        for (name, profile) in builtin_profiles() {
            assert_eq!(name, profile.name);
            assert!(profile.workload.validate().is_ok(), "{name} invalid");
        }
    }

    #[test]
    fn test_load_profile() {
        let profile = load_profile("retune").unwrap();
        assert_eq!(profile.workload.throttle, 0);
        assert_eq!(profile.workload.max_throttle, 6);
    }

    #[test]
    fn test_skewed_profile_offsets_tags() {
        let profile = load_profile("skewed").unwrap();
        assert_eq!(profile.workload.tag_skew, 100);
    }

    #[test]
    fn test_profile_not_found() {
        let result = load_profile("nonexistent");
        assert!(matches!(result, Err(ProfileError::NotFound { .. })));
    }

    #[test]
    fn test_list_profiles_sorted() {
        let names = list_profiles();
        assert_eq!(names.first(), Some(&"baseline"));
        assert!(names.contains(&"flaky-channel"));
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let profile = SimulationProfile::from_toml(
            r#"
            name = "custom"

            [workload]
            throttle = 3

            [workload.message_size]
            kind = "fixed"
            size = 10
            "#,
        )
        .unwrap();

        assert_eq!(profile.name, "custom");
        assert_eq!(profile.workload.throttle, 3);
        assert_eq!(profile.workload.message_size, SizeDistribution::Fixed { size: 10 });
        assert_eq!(profile.workload.operations, WorkloadConfig::default().operations);
        assert_eq!(profile.workload.mix, OperationMix::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let profile = load_profile("early-close").unwrap();
        let parsed = SimulationProfile::from_toml(&profile.to_toml()).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            SimulationProfile::from_toml("workload = 3"),
            Err(ProfileError::Parse { .. })
        ));
    }
}
