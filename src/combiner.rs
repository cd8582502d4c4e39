//! Main `Combiner` entry point and builder.

use log::debug;

use crate::analysis::{
    combine, combine_multi, design_matrix, gaussian_log_likelihood, BlueResult, MultiBlueResult,
};
use crate::config::{Config, UncertaintyForm};
use crate::error::{ConfigurationError, Error, Result};
use crate::model::{distinct_observables, CombinationModel, NuisanceValues};
use crate::statistics::{covariance_contributions, sum_contributions, total_covariance};
use crate::thread_pool;
use crate::types::{Matrix, Vector};

/// Main entry point for combinations.
///
/// Use the builder pattern to configure validation and run combinations.
///
/// # Example
///
/// ```ignore
/// use blue_combine::{Combiner, CombinationModel};
///
/// let result = Combiner::new()
///     .symmetry_tolerance(1e-6)
///     .blue(&model)?;
///
/// println!("{} ± {}", result.value, result.unc);
/// ```
///
/// Every operation takes the model by shared reference and allocates fresh
/// matrices, so one `Combiner` and one model can serve many threads at once.
/// Operations suffixed `_with` take explicit nuisance overrides instead of
/// the model's current values.
#[derive(Debug, Clone, Default)]
pub struct Combiner {
    config: Config,
}

impl Combiner {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create with tolerances suited to correlation tables copied from
    /// publications, which are often rounded.
    ///
    /// Settings:
    /// - symmetry tolerance 1e-6 (vs 1e-9 default)
    /// - diagonal tolerance 1e-6 (vs 1e-9 default)
    pub fn lenient() -> Self {
        Self {
            config: Config {
                symmetry_tolerance: 1e-6,
                diagonal_tolerance: 1e-6,
                ..Config::default()
            },
        }
    }

    /// Create from an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Set the correlation symmetry tolerance.
    pub fn symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.config.symmetry_tolerance = tolerance;
        self
    }

    /// Set the correlation unit-diagonal tolerance.
    pub fn diagonal_tolerance(mut self, tolerance: f64) -> Self {
        self.config.diagonal_tolerance = tolerance;
        self
    }

    /// Set how multi-observable uncertainties are evaluated.
    pub fn uncertainty_form(mut self, form: UncertaintyForm) -> Self {
        self.config.uncertainty_form = form;
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Total covariance of the active entries.
    pub fn total_covariance(&self, model: &CombinationModel) -> Result<Matrix> {
        self.total_covariance_with(model, &NuisanceValues::new())
    }

    /// Total covariance with explicit nuisance overrides.
    pub fn total_covariance_with(
        &self,
        model: &CombinationModel,
        nuisance: &NuisanceValues,
    ) -> Result<Matrix> {
        total_covariance(model, nuisance, &self.config)
    }

    /// Combine all active entries of a single observable.
    ///
    /// # Errors
    ///
    /// - [`Error::ObservableMismatch`] if the active entries measure more than
    ///   one observable; nothing is computed in that case
    /// - configuration errors from covariance assembly
    /// - [`Error::SingularMatrix`] if the total covariance cannot be inverted
    pub fn blue(&self, model: &CombinationModel) -> Result<BlueResult> {
        self.blue_with(model, &NuisanceValues::new())
    }

    /// [`blue`](Self::blue) with explicit nuisance overrides.
    pub fn blue_with(
        &self,
        model: &CombinationModel,
        nuisance: &NuisanceValues,
    ) -> Result<BlueResult> {
        let observables = model.active_observables();
        if observables.is_empty() {
            return Err(ConfigurationError::EmptyCombination.into());
        }
        let distinct = distinct_observables(&observables);
        if distinct.len() > 1 {
            return Err(Error::ObservableMismatch {
                observables: distinct
                    .iter()
                    .map(|o| {
                        let first = observables.iter().position(|a| a.same_as(o)).unwrap_or(0);
                        format!("{} (entry {})", o.name(), first)
                    })
                    .collect(),
            });
        }

        let sources = covariance_contributions(model, nuisance, &self.config)?;
        let covariance = sum_contributions(observables.len(), &sources);
        let result = combine(&model.active_values(), &covariance)?
            .with_breakdown(&sources)
            .with_entries(entry_labels(model));
        debug!(
            "combined {} entries: {} ± {} (χ²/ndf = {:.3}/{})",
            observables.len(),
            result.value,
            result.unc,
            result.chi2,
            result.ndf
        );
        Ok(result)
    }

    /// Combine active entries of any number of observables simultaneously.
    ///
    /// Observables are ordered by first appearance among the active entries.
    pub fn blue_multi(&self, model: &CombinationModel) -> Result<MultiBlueResult> {
        self.blue_multi_with(model, &NuisanceValues::new())
    }

    /// [`blue_multi`](Self::blue_multi) with explicit nuisance overrides.
    pub fn blue_multi_with(
        &self,
        model: &CombinationModel,
        nuisance: &NuisanceValues,
    ) -> Result<MultiBlueResult> {
        let covariance = self.total_covariance_with(model, nuisance)?;
        let (design, distinct) = design_matrix(&model.active_observables());
        let names = distinct.iter().map(|o| o.name().to_string()).collect();
        let result = combine_multi(
            &model.active_values(),
            &covariance,
            &design,
            names,
            self.config.uncertainty_form,
        )?;
        Ok(result.with_entries(entry_labels(model)))
    }

    /// Gaussian log-likelihood of the active entries at parameter point `params`.
    ///
    /// Each entry's prediction is its observable's transform evaluated at `params`.
    pub fn log_likelihood(&self, model: &CombinationModel, params: &[f64]) -> Result<f64> {
        self.log_likelihood_with(model, params, &NuisanceValues::new())
    }

    /// [`log_likelihood`](Self::log_likelihood) with explicit nuisance overrides.
    pub fn log_likelihood_with(
        &self,
        model: &CombinationModel,
        params: &[f64],
        nuisance: &NuisanceValues,
    ) -> Result<f64> {
        let covariance = self.total_covariance_with(model, nuisance)?;
        let observables = model.active_observables();
        let predictions = Vector::from_iterator(
            observables.len(),
            observables.iter().map(|o| o.predict(params)),
        );
        gaussian_log_likelihood(&model.active_values(), &predictions, &covariance)
    }

    /// Scalar BLUE for each set of nuisance values, in input order.
    ///
    /// Runs on the shared thread pool when the `parallel` feature is enabled.
    pub fn blue_samples(
        &self,
        model: &CombinationModel,
        samples: &[NuisanceValues],
    ) -> Vec<Result<BlueResult>> {
        self.evaluate_samples(samples, |s| self.blue_with(model, s))
    }

    /// Multi-observable BLUE for each set of nuisance values, in input order.
    pub fn blue_multi_samples(
        &self,
        model: &CombinationModel,
        samples: &[NuisanceValues],
    ) -> Vec<Result<MultiBlueResult>> {
        self.evaluate_samples(samples, |s| self.blue_multi_with(model, s))
    }

    #[cfg(feature = "parallel")]
    fn evaluate_samples<T, F>(&self, samples: &[NuisanceValues], evaluate: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(&NuisanceValues) -> Result<T> + Sync + Send,
    {
        use rayon::prelude::*;

        debug!("evaluating {} nuisance samples in parallel", samples.len());
        thread_pool::install(|| samples.par_iter().map(&evaluate).collect())
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_samples<T, F>(&self, samples: &[NuisanceValues], evaluate: F) -> Vec<Result<T>>
    where
        F: Fn(&NuisanceValues) -> Result<T>,
    {
        debug!("evaluating {} nuisance samples", samples.len());
        thread_pool::install(|| samples.iter().map(&evaluate).collect())
    }
}

fn entry_labels(model: &CombinationModel) -> Vec<String> {
    model
        .active_entry_ids()
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Measurement, NuisanceCorrelation, Observable, UncertaintyType};
    use crate::types::EntryId;

    fn top_mass_model() -> CombinationModel {
        let mass = Observable::parameter("m_top", 0);
        let mut model = CombinationModel::new();
        model
            .add_measurement(
                Measurement::scalar("atlas", 172.7, mass.clone())
                    .with_uncertainty("stat", 0.4)
                    .with_uncertainty("jes", 0.6),
            )
            .unwrap();
        model
            .add_measurement(
                Measurement::scalar("cms", 172.4, mass)
                    .with_uncertainty("stat", 0.3)
                    .with_uncertainty("jes", 0.7),
            )
            .unwrap();
        model
            .add_uncertainty(UncertaintyType::uncorrelated("stat"))
            .unwrap();
        model
            .add_uncertainty(UncertaintyType::uncorrelated("jes"))
            .unwrap();
        model
            .add_nuisance(NuisanceCorrelation::new(
                "jes",
                EntryId::scalar("atlas"),
                EntryId::scalar("cms"),
                0.0,
                1.0,
            ))
            .unwrap();
        model
    }

    #[test]
    fn test_builder_config() {
        let combiner = Combiner::new()
            .symmetry_tolerance(1e-4)
            .diagonal_tolerance(1e-5)
            .uncertainty_form(UncertaintyForm::DiagonalProduct);
        let config = combiner.config();
        assert_eq!(config.symmetry_tolerance, 1e-4);
        assert_eq!(config.diagonal_tolerance, 1e-5);
        assert_eq!(config.uncertainty_form, UncertaintyForm::DiagonalProduct);
        assert_eq!(Combiner::lenient().config().symmetry_tolerance, 1e-6);
    }

    #[test]
    fn test_blue_with_breakdown() {
        let model = top_mass_model();
        let r = Combiner::new().blue(&model).unwrap();
        assert!((r.weights.sum() - 1.0).abs() < 1e-12);
        assert!(r.value > 172.4 && r.value < 172.7);
        assert_eq!(r.entries, vec!["atlas[0]".to_string(), "cms[0]".to_string()]);
        let names: Vec<&str> = r.breakdown.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["stat", "jes"]);
        let quad: f64 = r.breakdown.iter().map(|c| c.unc * c.unc).sum();
        assert!((quad.sqrt() - r.unc).abs() < 1e-12);
    }

    #[test]
    fn test_blue_mixed_observables() {
        let mut model = top_mass_model();
        model
            .add_measurement(
                Measurement::scalar("width", 1.4, Observable::parameter("gamma_top", 1))
                    .with_uncertainty("stat", 0.2),
            )
            .unwrap();
        let err = Combiner::new().blue(&model).unwrap_err();
        assert_eq!(
            err,
            Error::ObservableMismatch {
                observables: vec!["m_top (entry 0)".to_string(), "gamma_top (entry 2)".to_string()]
            }
        );

        // Deactivating the odd one out makes the combination valid again.
        model.set_active("width", false).unwrap();
        assert!(Combiner::new().blue(&model).is_ok());
    }

    #[test]
    fn test_mismatch_labels_distinguish_equal_names() {
        let mut model = CombinationModel::new();
        for (name, value) in [("a", 1.0), ("b", 1.2), ("c", 0.9)] {
            let obs = if name == "c" {
                Observable::parameter("y", 1)
            } else {
                Observable::parameter("x", 0)
            };
            model
                .add_measurement(Measurement::scalar(name, value, obs).with_uncertainty("stat", 1.0))
                .unwrap();
        }
        model
            .add_uncertainty(UncertaintyType::uncorrelated("stat"))
            .unwrap();

        let err = Combiner::new().blue(&model).unwrap_err();
        assert_eq!(
            err,
            Error::ObservableMismatch {
                observables: vec![
                    "x (entry 0)".to_string(),
                    "x (entry 1)".to_string(),
                    "y (entry 2)".to_string()
                ]
            }
        );
        assert!(err.to_string().contains("x (entry 0), x (entry 1)"));
    }

    #[test]
    fn test_single_fully_correlated_source_is_singular() {
        for (a, b) in [(0.1, 0.3), (0.3, 0.7), (0.7, 1.3), (1.1, 2.9)] {
            let obs = Observable::parameter("x", 0);
            let mut model = CombinationModel::new();
            model
                .add_measurement(Measurement::scalar("a", 1.0, obs.clone()).with_uncertainty("lumi", a))
                .unwrap();
            model
                .add_measurement(Measurement::scalar("b", 1.1, obs).with_uncertainty("lumi", b))
                .unwrap();
            model
                .add_uncertainty(UncertaintyType::fully_correlated("lumi", 2))
                .unwrap();

            assert_eq!(
                Combiner::new().blue(&model).unwrap_err(),
                Error::SingularMatrix { context: "covariance" },
                "σ = ({}, {})",
                a,
                b
            );
            assert!(matches!(
                Combiner::new().blue_multi(&model),
                Err(Error::SingularMatrix { context: "covariance" })
            ));
        }
    }

    #[test]
    fn test_nuisance_value_changes_result() {
        let model = top_mass_model();
        let combiner = Combiner::new();
        let low = NuisanceValues::new().with("jes", EntryId::scalar("atlas"), EntryId::scalar("cms"), 0.0);
        let high = NuisanceValues::new().with("jes", EntryId::scalar("atlas"), EntryId::scalar("cms"), 1.0);
        let r_low = combiner.blue_with(&model, &low).unwrap();
        let r_high = combiner.blue_with(&model, &high).unwrap();
        assert!(r_high.unc > r_low.unc);
    }

    #[test]
    fn test_samples_preserve_order() {
        let model = top_mass_model();
        let combiner = Combiner::new();
        let samples: Vec<NuisanceValues> = (0..=10)
            .map(|i| {
                NuisanceValues::new().with(
                    "jes",
                    EntryId::scalar("atlas"),
                    EntryId::scalar("cms"),
                    i as f64 / 10.0,
                )
            })
            .collect();

        let batch = combiner.blue_samples(&model, &samples);
        assert_eq!(batch.len(), samples.len());
        for (sample, result) in samples.iter().zip(&batch) {
            let single = combiner.blue_with(&model, sample).unwrap();
            assert_eq!(result.as_ref().unwrap(), &single);
        }

        let multi = combiner.blue_multi_samples(&model, &samples);
        assert_eq!(multi.len(), samples.len());
        assert!(multi.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_log_likelihood_peaks_near_combination() {
        let model = top_mass_model();
        let combiner = Combiner::new();
        let best = combiner.blue(&model).unwrap().value;
        let at_best = combiner.log_likelihood(&model, &[best]).unwrap();
        let away = combiner.log_likelihood(&model, &[best + 1.0]).unwrap();
        assert!(at_best > away);
    }
}
