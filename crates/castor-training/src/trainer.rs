//! Training calls against a session's model.

use crate::artifacts::ArtifactKind;
use crate::config::{OptimizerDefaults, SessionConfig};
use crate::error::{ModelError, ModelResult};
use crate::notice::Notice;
use crate::session::ModelSession;
use crate::table_ref::TableRef;
use castor_abstraction::{AlgorithmConfig, OptimizerConfig, TrainOutcome, TrainRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Caller-supplied optimizer. Unset batch size, epoch count and log level are
/// filled from the `fit` call. An unset algorithm is left to the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerOverride {
    pub algorithm: Option<AlgorithmConfig>,
    pub mini_batch_size: Option<u32>,
    pub max_epochs: Option<u32>,
    pub log_level: Option<u8>,
    /// Passed through to the service untouched.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Options of one `fit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub inputs: String,
    pub target: String,
    pub batch_size: u32,
    pub max_epochs: u32,
    pub log_level: u8,
    pub learning_rate: f64,
    pub optimizer: Option<OptimizerOverride>,
    /// Extra options for the training action.
    pub extra: Map<String, Value>,
}

impl FitOptions {
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            inputs: config.inputs.clone(),
            target: config.target.clone(),
            batch_size: config.batch_size,
            max_epochs: config.max_epochs,
            log_level: config.log_level,
            learning_rate: config.learning_rate,
            optimizer: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_max_epochs(mut self, max_epochs: u32) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerOverride) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.inputs.trim().is_empty() || self.target.trim().is_empty() {
            return Err(ModelError::InvalidOptions(
                "inputs and target must not be empty".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ModelError::InvalidOptions("learning_rate must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Build the optimizer sent to the training service.
#[must_use]
pub fn resolve_optimizer(defaults: &OptimizerDefaults, options: &FitOptions) -> OptimizerConfig {
    match &options.optimizer {
        None => OptimizerConfig {
            algorithm: Some(AlgorithmConfig {
                method: defaults.method.clone(),
                learning_rate: Some(options.learning_rate),
                clip_grad_min: Some(defaults.clip_grad_min),
                clip_grad_max: Some(defaults.clip_grad_max),
                lr_policy: Some(defaults.lr_policy.clone()),
                step_size: Some(defaults.step_size),
                extra: Map::new(),
            }),
            mini_batch_size: options.batch_size,
            max_epochs: options.max_epochs,
            log_level: options.log_level,
            extra: Map::new(),
        },
        Some(custom) => OptimizerConfig {
            algorithm: custom.algorithm.clone(),
            mini_batch_size: custom.mini_batch_size.unwrap_or(options.batch_size),
            max_epochs: custom.max_epochs.unwrap_or(options.max_epochs),
            log_level: custom.log_level.unwrap_or(options.log_level),
            extra: custom.extra.clone(),
        },
    }
}

fn validate_optimizer(optimizer: &OptimizerConfig) -> ModelResult<()> {
    if optimizer.max_epochs == 0 {
        return Err(ModelError::InvalidOptions("max_epochs must be >= 1".to_string()));
    }
    if optimizer.mini_batch_size == 0 {
        return Err(ModelError::InvalidOptions("batch_size must be >= 1".to_string()));
    }
    if optimizer.log_level > 3 {
        return Err(ModelError::InvalidOptions("log_level must be between 0 and 3".to_string()));
    }
    Ok(())
}

impl ModelSession {
    /// `FitOptions` seeded from this session's configuration.
    #[must_use]
    pub fn fit_options(&self) -> FitOptions {
        FitOptions::from_config(&self.config)
    }

    /// Train the model on `data`, writing the result into `{name}_weights`.
    ///
    /// Existing weights are used as a warm start. The returned iteration
    /// history is appended to the session history with epochs continuing from
    /// previous calls; the raw service outcome is returned unchanged.
    pub async fn fit(
        &mut self,
        data: impl Into<TableRef>,
        options: FitOptions,
    ) -> ModelResult<TrainOutcome> {
        let table = data.into().normalize()?;
        options.validate()?;
        let optimizer = resolve_optimizer(&self.config.optimizer, &options);
        validate_optimizer(&optimizer)?;
        let requested_epochs = optimizer.max_epochs;

        let weights = self.weights_table();
        let warm_start = self
            .services
            .tables
            .table_exists(&weights.name)
            .await
            .map_err(|e| {
                ModelError::remote("table info", ArtifactKind::Weights, &weights.name, e)
            })?;
        if !warm_start {
            self.notify(Notice::TrainingFromScratch { model: self.name.clone() });
        }

        let request = TrainRequest {
            model: self.name.clone(),
            table: table.clone(),
            inputs: vec![options.inputs],
            target: options.target,
            init_weights: warm_start.then(|| weights.clone()),
            model_weights: weights.clone(),
            replace: true,
            optimizer,
            extra: options.extra,
        };

        debug!(
            model = %self.name,
            data = %table.name,
            epochs = requested_epochs,
            warm_start,
            "Submitting training request"
        );
        let outcome = self
            .services
            .training
            .train(request)
            .await
            .map_err(|e| ModelError::remote("train", ArtifactKind::TrainingData, &table.name, e))?;

        self.weights_bound = true;
        // The replaced weight table carries no attributes.
        self.weight_attrs = None;
        let added = self
            .history
            .merge(&outcome.iteration_history, requested_epochs, self.config.epoch_accounting)
            .len();
        let total_epochs = self.history.cumulative_epochs();

        info!(model = %self.name, epochs_added = added, total_epochs, "Training finished");
        self.notify(Notice::TrainingFinished { model: self.name.clone(), total_epochs });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_optimizer() {
        let options = FitOptions::default().with_max_epochs(7).with_batch_size(16);
        let optimizer = resolve_optimizer(&OptimizerDefaults::default(), &options);
        let algorithm = optimizer.algorithm.expect("default algorithm");

        assert_eq!(algorithm.method, "momentum");
        assert_eq!(algorithm.clip_grad_min, Some(-1000.0));
        assert_eq!(algorithm.clip_grad_max, Some(1000.0));
        assert_eq!(algorithm.lr_policy.as_deref(), Some("step"));
        assert_eq!(algorithm.step_size, Some(15));
        assert_eq!(algorithm.learning_rate, Some(0.01));
        assert_eq!(optimizer.mini_batch_size, 16);
        assert_eq!(optimizer.max_epochs, 7);
        assert_eq!(optimizer.log_level, 3);
    }

    #[test]
    fn test_override_fills_only_unset_fields() {
        let custom = OptimizerOverride {
            algorithm: Some(AlgorithmConfig {
                method: "adam".to_string(),
                learning_rate: Some(0.001),
                clip_grad_min: None,
                clip_grad_max: None,
                lr_policy: None,
                step_size: None,
                extra: Map::new(),
            }),
            mini_batch_size: Some(64),
            max_epochs: None,
            log_level: None,
            extra: Map::from_iter([("regL2".to_string(), json!(0.0005))]),
        };
        let options = FitOptions::default().with_max_epochs(12).with_optimizer(custom);
        let optimizer = resolve_optimizer(&OptimizerDefaults::default(), &options);

        let algorithm = optimizer.algorithm.as_ref().expect("override algorithm");
        assert_eq!(algorithm.method, "adam");
        assert_eq!(algorithm.clip_grad_max, None);
        assert_eq!(optimizer.mini_batch_size, 64);
        assert_eq!(optimizer.max_epochs, 12);
        assert_eq!(optimizer.log_level, 3);
        assert_eq!(optimizer.extra.get("regL2"), Some(&json!(0.0005)));
    }

    #[test]
    fn test_override_without_algorithm_leaves_it_to_the_service() {
        let options = FitOptions::default().with_optimizer(OptimizerOverride::default());
        let optimizer = resolve_optimizer(&OptimizerDefaults::default(), &options);
        assert!(optimizer.algorithm.is_none());
        assert_eq!(optimizer.max_epochs, 5);

        let value = serde_json::to_value(&optimizer).unwrap();
        assert!(value.get("algorithm").is_none());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert!(FitOptions::default().with_learning_rate(0.0).validate().is_err());
        let zero_epochs = resolve_optimizer(
            &OptimizerDefaults::default(),
            &FitOptions::default().with_max_epochs(0),
        );
        assert!(matches!(validate_optimizer(&zero_epochs), Err(ModelError::InvalidOptions(_))));
    }
}
