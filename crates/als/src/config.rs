//! Service configuration.
//!
//! Configuration is read from environment variables with the
//! `RECO_GATEWAY_` prefix, with defaults for everything optional and a
//! `validate()` pass with clear error messages. `.env` files are honored
//! when the binary calls `dotenvy::dotenv()` before loading.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::types::HyperParamGrid;

/// What side-channel data accompanies published factor vectors.
///
/// Known-user sets on item records are off by default; sending them has no
/// consumer today, but the switch exists so the asymmetry is configuration,
/// not code.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Attach the known-item set to each user-factor record where one
    /// exists.
    pub known_items: bool,
    /// Attach the known-user set to each item-factor record where one
    /// exists.
    pub known_users: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            known_items: true,
            known_users: false,
        }
    }
}

/// ALS update-cycle configuration.
///
/// # Environment Variables
///
/// - `RECO_GATEWAY_ALS_IMPLICIT`: implicit-feedback mode (default: true)
/// - `RECO_GATEWAY_ALS_ITERATIONS`: solver iterations, > 0 (default: 10)
/// - `RECO_GATEWAY_ALS_TEST_FRACTION`: held-out split fraction in (0, 1)
///   (default: 0.1)
/// - `RECO_GATEWAY_ALS_FEATURES`: candidate factor counts, comma-separated
///   (default: "10")
/// - `RECO_GATEWAY_ALS_LAMBDA`: candidate regularization values
///   (default: "0.001")
/// - `RECO_GATEWAY_ALS_ALPHA`: candidate confidence scales
///   (default: "1.0")
/// - `RECO_GATEWAY_ALS_KNOWN_ITEMS`: publish known-item sets (default: true)
/// - `RECO_GATEWAY_ALS_KNOWN_USERS`: publish known-user sets (default: false)
#[derive(Debug, Clone)]
pub struct AlsConfig {
    pub implicit: bool,
    pub iterations: usize,
    pub test_fraction: f64,
    pub hyper_grid: HyperParamGrid,
    pub publish: PublishConfig,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            implicit: true,
            iterations: 10,
            test_fraction: 0.1,
            hyper_grid: HyperParamGrid {
                features: vec![10],
                regularization: vec![0.001],
                alpha: vec![1.0],
            },
            publish: PublishConfig::default(),
        }
    }
}

impl AlsConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = AlsConfig::default();

        Ok(Self {
            implicit: parse_env_var("RECO_GATEWAY_ALS_IMPLICIT", defaults.implicit)?,
            iterations: parse_env_var("RECO_GATEWAY_ALS_ITERATIONS", defaults.iterations)?,
            test_fraction: parse_env_var(
                "RECO_GATEWAY_ALS_TEST_FRACTION",
                defaults.test_fraction,
            )?,
            hyper_grid: HyperParamGrid {
                features: parse_env_list(
                    "RECO_GATEWAY_ALS_FEATURES",
                    defaults.hyper_grid.features,
                )?,
                regularization: parse_env_list(
                    "RECO_GATEWAY_ALS_LAMBDA",
                    defaults.hyper_grid.regularization,
                )?,
                alpha: parse_env_list("RECO_GATEWAY_ALS_ALPHA", defaults.hyper_grid.alpha)?,
            },
            publish: PublishConfig {
                known_items: parse_env_var(
                    "RECO_GATEWAY_ALS_KNOWN_ITEMS",
                    defaults.publish.known_items,
                )?,
                known_users: parse_env_var(
                    "RECO_GATEWAY_ALS_KNOWN_USERS",
                    defaults.publish.known_users,
                )?,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(PipelineError::Config(
                "RECO_GATEWAY_ALS_ITERATIONS must be > 0".to_string(),
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "RECO_GATEWAY_ALS_TEST_FRACTION must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.hyper_grid.features.is_empty()
            || self.hyper_grid.regularization.is_empty()
            || self.hyper_grid.alpha.is_empty()
        {
            return Err(PipelineError::Config(
                "hyperparameter candidate lists must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Service-level configuration for the update binary.
///
/// # Environment Variables
///
/// - `RECO_GATEWAY_NEW_DATA` (required): path to the new-batch record file
/// - `RECO_GATEWAY_PAST_DATA` (optional): path to the historical window
/// - `RECO_GATEWAY_WORK_DIR`: model output directory
///   (default: "model-updates")
/// - `RECO_GATEWAY_KAFKA_BROKERS` (optional): update queue brokers; when
///   unset, updates are logged and dropped
/// - `RECO_GATEWAY_UPDATE_TOPIC`: queue topic
///   (default: "reco-gateway.model-updates")
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub new_data: PathBuf,
    pub past_data: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub kafka_brokers: Option<String>,
    pub update_topic: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let new_data = std::env::var("RECO_GATEWAY_NEW_DATA").map_err(|_| {
            PipelineError::Config("RECO_GATEWAY_NEW_DATA must be set".to_string())
        })?;

        Ok(Self {
            new_data: PathBuf::from(new_data),
            past_data: std::env::var("RECO_GATEWAY_PAST_DATA").ok().map(PathBuf::from),
            work_dir: PathBuf::from(
                std::env::var("RECO_GATEWAY_WORK_DIR")
                    .unwrap_or_else(|_| "model-updates".to_string()),
            ),
            kafka_brokers: std::env::var("RECO_GATEWAY_KAFKA_BROKERS").ok(),
            update_topic: std::env::var("RECO_GATEWAY_UPDATE_TOPIC")
                .unwrap_or_else(|_| "reco-gateway.model-updates".to_string()),
        })
    }
}

fn parse_env_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| {
            PipelineError::Config(format!("cannot parse {name}={value:?}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_list<T: FromStr>(name: &str, default: Vec<T>) -> Result<Vec<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .split(',')
            .map(|part| {
                part.trim().parse::<T>().map_err(|_| {
                    PipelineError::Config(format!("cannot parse element {part:?} of {name}"))
                })
            })
            .collect(),
        Err(_) => Ok(default),
    }
}
