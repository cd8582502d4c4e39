//! Measurement model consumed by the covariance builder and the estimators.
//!
//! A [`CombinationModel`] holds:
//! - ordered [`Measurement`]s, each scalar or binned, with per-bin activation flags
//! - named [`UncertaintyType`]s with their correlation structure
//! - [`NuisanceCorrelation`]s, correlation coefficients treated as live parameters
//!
//! Measurements are flattened bin-wise into *entries* ([`EntryId`]). Correlation
//! matrices are indexed by the full flattened entry list; the covariance builder
//! restricts them to the currently active entries on every call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigurationError, Result};
use crate::types::{EntryId, Matrix, Vector};

type Transform = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// A physical quantity, identified by its prediction transform.
///
/// Cloning is cheap and keeps identity: two handles compare equal only when
/// they share the same transform object. Two observables with equal names but
/// separately constructed transforms are different observables.
#[derive(Clone)]
pub struct Observable {
    inner: Arc<ObservableInner>,
}

struct ObservableInner {
    name: String,
    transform: Box<Transform>,
}

impl Observable {
    /// Create an observable from a transform mapping parameters to a prediction.
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ObservableInner {
                name: name.into(),
                transform: Box::new(transform),
            }),
        }
    }

    /// Observable that predicts one parameter directly: `params ↦ params[index]`.
    pub fn parameter(name: impl Into<String>, index: usize) -> Self {
        Self::new(name, move |params: &[f64]| params.get(index).copied().unwrap_or(f64::NAN))
    }

    /// Prediction for bin `index` of a linear response table.
    ///
    /// `coefficients[index][k]` is the contribution of parameter `k` to the
    /// bin, so the prediction is `Σ_k coefficients[index][k] · params[k]`.
    /// The table is shared between all bins built from it.
    pub fn bin(name: impl Into<String>, index: usize, coefficients: Arc<Vec<Vec<f64>>>) -> Self {
        Self::new(name, move |params: &[f64]| match coefficients.get(index) {
            Some(row) => row.iter().zip(params).map(|(c, p)| c * p).sum(),
            None => f64::NAN,
        })
    }

    /// One observable per row of a linear response table, named `name[i]`.
    pub fn bins(name: &str, coefficients: Vec<Vec<f64>>) -> Vec<Self> {
        let table = Arc::new(coefficients);
        (0..table.len())
            .map(|i| Self::bin(format!("{}[{}]", name, i), i, Arc::clone(&table)))
            .collect()
    }

    /// Display name. Not used for identity.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Evaluate the prediction at a parameter point.
    pub fn predict(&self, params: &[f64]) -> f64 {
        (self.inner.transform)(params)
    }

    /// Whether both handles refer to the same transform.
    pub fn same_as(&self, other: &Observable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Observable {}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("name", &self.inner.name)
            .field("id", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Distinct observables in order of first appearance.
pub fn distinct_observables<'a, I>(observables: I) -> Vec<Observable>
where
    I: IntoIterator<Item = &'a Observable>,
{
    let mut distinct: Vec<Observable> = Vec::new();
    for obs in observables {
        if !distinct.iter().any(|d| d.same_as(obs)) {
            distinct.push(obs.clone());
        }
    }
    distinct
}

/// A measured value, scalar or binned, with its uncertainty magnitudes.
#[derive(Debug, Clone)]
pub struct Measurement {
    name: String,
    values: Vec<f64>,
    observables: Vec<Observable>,
    uncertainties: BTreeMap<String, Vec<f64>>,
    active: Vec<bool>,
}

impl Measurement {
    /// Scalar measurement of one observable.
    pub fn scalar(name: impl Into<String>, value: f64, observable: Observable) -> Self {
        Self {
            name: name.into(),
            values: vec![value],
            observables: vec![observable],
            uncertainties: BTreeMap::new(),
            active: vec![true],
        }
    }

    /// Binned measurement; bin `i` measures `observables[i]`.
    pub fn binned(
        name: impl Into<String>,
        values: Vec<f64>,
        observables: Vec<Observable>,
    ) -> Result<Self> {
        let name = name.into();
        if observables.len() != values.len() {
            return Err(ConfigurationError::LengthMismatch {
                what: format!("observables of '{}'", name),
                expected: values.len(),
                found: observables.len(),
            }
            .into());
        }
        let n = values.len();
        Ok(Self {
            name,
            values,
            observables,
            uncertainties: BTreeMap::new(),
            active: vec![true; n],
        })
    }

    /// Attach an uncertainty source with the same magnitude in every bin.
    pub fn with_uncertainty(mut self, source: impl Into<String>, magnitude: f64) -> Self {
        let n = self.values.len();
        self.uncertainties.insert(source.into(), vec![magnitude; n]);
        self
    }

    /// Attach an uncertainty source with one magnitude per bin.
    pub fn with_binned_uncertainty(
        mut self,
        source: impl Into<String>,
        magnitudes: Vec<f64>,
    ) -> Result<Self> {
        let source = source.into();
        if magnitudes.len() != self.values.len() {
            return Err(ConfigurationError::LengthMismatch {
                what: format!("'{}' magnitudes of '{}'", source, self.name),
                expected: self.values.len(),
                found: magnitudes.len(),
            }
            .into());
        }
        self.uncertainties.insert(source, magnitudes);
        Ok(self)
    }

    /// Measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Measured values, one per bin.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Observables, one per bin.
    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    /// Number of bins (1 for scalar measurements).
    pub fn n_bins(&self) -> usize {
        self.values.len()
    }

    /// Magnitude of `source` in `bin`; zero when the source does not affect this measurement.
    pub fn magnitude(&self, source: &str, bin: usize) -> f64 {
        self.uncertainties
            .get(source)
            .and_then(|m| m.get(bin))
            .copied()
            .unwrap_or(0.0)
    }

    /// Names of the uncertainty sources attached to this measurement.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.uncertainties.keys().map(String::as_str)
    }

    /// Whether `bin` takes part in the combination.
    pub fn is_active(&self, bin: usize) -> bool {
        self.active.get(bin).copied().unwrap_or(false)
    }
}

/// Correlation structure of an uncertainty source across all model entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// Entries are uncorrelated.
    Identity,
    /// Explicit symmetric matrix over the full flattened entry list.
    Matrix(Matrix),
}

/// A named source of uncertainty.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyType {
    name: String,
    correlation: Correlation,
    active: bool,
}

impl UncertaintyType {
    /// Source whose entries are uncorrelated.
    pub fn uncorrelated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation: Correlation::Identity,
            active: true,
        }
    }

    /// Source with an explicit correlation matrix over all model entries.
    pub fn correlated(name: impl Into<String>, correlation: Matrix) -> Self {
        Self {
            name: name.into(),
            correlation: Correlation::Matrix(correlation),
            active: true,
        }
    }

    /// Source with every pair of entries fully correlated.
    pub fn fully_correlated(name: impl Into<String>, n_entries: usize) -> Self {
        Self::correlated(name, Matrix::from_element(n_entries, n_entries, 1.0))
    }

    /// Set the activation flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlation structure.
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Whether the source contributes to the total covariance.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Key of one nuisance correlation: an uncertainty type and an unordered entry pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NuisanceKey {
    /// Uncertainty type whose correlation is overridden.
    pub uncertainty: String,
    /// The two entries, stored in ascending order.
    pub pair: (EntryId, EntryId),
}

impl NuisanceKey {
    /// Build a key; the order of `first` and `second` does not matter.
    pub fn new(uncertainty: impl Into<String>, first: EntryId, second: EntryId) -> Self {
        let pair = if first <= second {
            (first, second)
        } else {
            (second, first)
        };
        Self {
            uncertainty: uncertainty.into(),
            pair,
        }
    }
}

impl fmt::Display for NuisanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}~{}", self.uncertainty, self.pair.0, self.pair.1)
    }
}

/// A correlation coefficient treated as an uncertain parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct NuisanceCorrelation {
    key: NuisanceKey,
    range: (f64, f64),
    value: f64,
}

impl NuisanceCorrelation {
    /// Nuisance correlation between two entries with a prior range `[low, high]`.
    ///
    /// The current value starts at the centre of the range.
    pub fn new(
        uncertainty: impl Into<String>,
        first: EntryId,
        second: EntryId,
        low: f64,
        high: f64,
    ) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            key: NuisanceKey::new(uncertainty, first, second),
            range: (low.max(-1.0), high.min(1.0)),
            value: 0.5 * (low.max(-1.0) + high.min(1.0)),
        }
    }

    /// Set the current value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Uncertainty type and entry pair.
    pub fn key(&self) -> &NuisanceKey {
        &self.key
    }

    /// Prior range `(low, high)`, clipped to [-1, 1].
    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Check `value` against the prior range.
    pub fn check(&self, value: f64) -> Result<f64> {
        let (low, high) = self.range;
        if value.is_finite() && value >= low && value <= high {
            Ok(value)
        } else {
            Err(ConfigurationError::NuisanceOutOfRange {
                uncertainty: self.key.uncertainty.clone(),
                value,
                low,
                high,
            }
            .into())
        }
    }
}

/// Explicit override map of nuisance correlation values.
///
/// Supplied per call so that several samples can be evaluated concurrently
/// against one shared model. Keys missing from the map fall back to the
/// model's current values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NuisanceValues {
    values: BTreeMap<NuisanceKey, f64>,
}

impl NuisanceValues {
    /// Empty override map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coefficient for one entry pair of one uncertainty type.
    pub fn set(
        &mut self,
        uncertainty: impl Into<String>,
        first: EntryId,
        second: EntryId,
        value: f64,
    ) -> &mut Self {
        self.values
            .insert(NuisanceKey::new(uncertainty, first, second), value);
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(
        mut self,
        uncertainty: impl Into<String>,
        first: EntryId,
        second: EntryId,
        value: f64,
    ) -> Self {
        self.set(uncertainty, first, second, value);
        self
    }

    /// Override value for `key`, if any.
    pub fn get(&self, key: &NuisanceKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Iterate over all overrides.
    pub fn iter(&self) -> impl Iterator<Item = (&NuisanceKey, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    /// Number of overrides.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no override is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Measurements, uncertainty sources and nuisance correlations of one combination.
#[derive(Debug, Clone, Default)]
pub struct CombinationModel {
    measurements: Vec<Measurement>,
    uncertainties: Vec<UncertaintyType>,
    nuisances: Vec<NuisanceCorrelation>,
}

impl CombinationModel {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a measurement. Names must be unique.
    pub fn add_measurement(&mut self, measurement: Measurement) -> Result<&mut Self> {
        if self.measurement(measurement.name()).is_some() {
            return Err(ConfigurationError::Duplicate {
                kind: "measurement",
                name: measurement.name().to_string(),
            }
            .into());
        }
        self.measurements.push(measurement);
        Ok(self)
    }

    /// Register an uncertainty source. Names must be unique.
    pub fn add_uncertainty(&mut self, uncertainty: UncertaintyType) -> Result<&mut Self> {
        if self.uncertainty(uncertainty.name()).is_some() {
            return Err(ConfigurationError::Duplicate {
                kind: "uncertainty",
                name: uncertainty.name().to_string(),
            }
            .into());
        }
        self.uncertainties.push(uncertainty);
        Ok(self)
    }

    /// Register a nuisance correlation.
    ///
    /// The uncertainty type and both entries must already exist, the entries
    /// must differ, and the current value must lie in the prior range.
    pub fn add_nuisance(&mut self, nuisance: NuisanceCorrelation) -> Result<&mut Self> {
        let key = nuisance.key().clone();
        if self.uncertainty(&key.uncertainty).is_none() {
            return Err(ConfigurationError::Unknown {
                kind: "uncertainty",
                name: key.uncertainty,
            }
            .into());
        }
        self.require_entry(&key.pair.0)?;
        self.require_entry(&key.pair.1)?;
        if key.pair.0 == key.pair.1 {
            return Err(ConfigurationError::DiagonalNuisance {
                uncertainty: key.uncertainty,
                entry: key.pair.0.to_string(),
            }
            .into());
        }
        if self.nuisances.iter().any(|n| n.key() == &key) {
            return Err(ConfigurationError::Duplicate {
                kind: "nuisance correlation",
                name: key.to_string(),
            }
            .into());
        }
        nuisance.check(nuisance.value())?;
        self.nuisances.push(nuisance);
        Ok(self)
    }

    /// Activate or deactivate every bin of a measurement.
    pub fn set_active(&mut self, measurement: &str, active: bool) -> Result<()> {
        let m = self.measurement_mut(measurement)?;
        m.active.iter_mut().for_each(|flag| *flag = active);
        Ok(())
    }

    /// Activate or deactivate a single bin.
    pub fn set_bin_active(&mut self, measurement: &str, bin: usize, active: bool) -> Result<()> {
        let m = self.measurement_mut(measurement)?;
        match m.active.get_mut(bin) {
            Some(flag) => {
                *flag = active;
                Ok(())
            }
            None => Err(ConfigurationError::Unknown {
                kind: "bin",
                name: EntryId::new(measurement, bin).to_string(),
            }
            .into()),
        }
    }

    /// Activate or deactivate an uncertainty source.
    pub fn set_uncertainty_active(&mut self, name: &str, active: bool) -> Result<()> {
        match self.uncertainties.iter_mut().find(|u| u.name == name) {
            Some(u) => {
                u.active = active;
                Ok(())
            }
            None => Err(ConfigurationError::Unknown {
                kind: "uncertainty",
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Update the current value of a registered nuisance correlation.
    pub fn set_nuisance_value(&mut self, key: &NuisanceKey, value: f64) -> Result<()> {
        let nuisance = self
            .nuisances
            .iter_mut()
            .find(|n| &n.key == key)
            .ok_or_else(|| ConfigurationError::Unknown {
                kind: "nuisance correlation",
                name: key.to_string(),
            })?;
        nuisance.value = nuisance.check(value)?;
        Ok(())
    }

    /// Measurements in insertion order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Uncertainty sources in insertion order.
    pub fn uncertainties(&self) -> &[UncertaintyType] {
        &self.uncertainties
    }

    /// Registered nuisance correlations.
    pub fn nuisances(&self) -> &[NuisanceCorrelation] {
        &self.nuisances
    }

    /// Look up a measurement by name.
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }

    /// Look up an uncertainty source by name.
    pub fn uncertainty(&self, name: &str) -> Option<&UncertaintyType> {
        self.uncertainties.iter().find(|u| u.name == name)
    }

    /// Current nuisance values as an override map.
    pub fn nuisance_values(&self) -> NuisanceValues {
        NuisanceValues {
            values: self
                .nuisances
                .iter()
                .map(|n| (n.key.clone(), n.value))
                .collect(),
        }
    }

    /// Every entry of the model, active or not, in flattened order.
    pub fn entries(&self) -> Vec<EntryId> {
        self.measurements
            .iter()
            .flat_map(|m| (0..m.n_bins()).map(move |bin| EntryId::new(m.name.clone(), bin)))
            .collect()
    }

    /// Total number of entries, active or not.
    pub fn entry_count(&self) -> usize {
        self.measurements.iter().map(Measurement::n_bins).sum()
    }

    /// Position of `entry` in the flattened entry list.
    pub fn entry_index(&self, entry: &EntryId) -> Option<usize> {
        let mut offset = 0;
        for m in &self.measurements {
            if m.name == entry.measurement {
                return (entry.bin < m.n_bins()).then_some(offset + entry.bin);
            }
            offset += m.n_bins();
        }
        None
    }

    /// Currently active entries, recomputed from the activation flags.
    pub fn active_entries(&self) -> Vec<ActiveEntry<'_>> {
        let mut index = 0;
        let mut active = Vec::new();
        for m in &self.measurements {
            for bin in 0..m.n_bins() {
                if m.is_active(bin) {
                    active.push(ActiveEntry {
                        index,
                        measurement: m,
                        bin,
                    });
                }
                index += 1;
            }
        }
        active
    }

    /// Identifiers of the active entries.
    pub fn active_entry_ids(&self) -> Vec<EntryId> {
        self.active_entries().iter().map(ActiveEntry::id).collect()
    }

    /// Values of the active entries.
    pub fn active_values(&self) -> Vector {
        let entries = self.active_entries();
        Vector::from_iterator(entries.len(), entries.iter().map(ActiveEntry::value))
    }

    /// Observables of the active entries.
    pub fn active_observables(&self) -> Vec<Observable> {
        self.active_entries()
            .iter()
            .map(|e| e.observable().clone())
            .collect()
    }

    fn measurement_mut(&mut self, name: &str) -> Result<&mut Measurement> {
        self.measurements
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| {
                ConfigurationError::Unknown {
                    kind: "measurement",
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn require_entry(&self, entry: &EntryId) -> Result<usize> {
        self.entry_index(entry).ok_or_else(|| {
            ConfigurationError::Unknown {
                kind: "entry",
                name: entry.to_string(),
            }
            .into()
        })
    }
}

/// One active entry: a bin of a measurement and its position in the flattened list.
#[derive(Debug, Clone, Copy)]
pub struct ActiveEntry<'a> {
    /// Index into the full flattened entry list (and into correlation matrices).
    pub index: usize,
    /// Owning measurement.
    pub measurement: &'a Measurement,
    /// Bin within the measurement.
    pub bin: usize,
}

impl ActiveEntry<'_> {
    /// Identifier of this entry.
    pub fn id(&self) -> EntryId {
        EntryId::new(self.measurement.name.clone(), self.bin)
    }

    /// Measured value of this entry.
    pub fn value(&self) -> f64 {
        self.measurement.values[self.bin]
    }

    /// Observable this entry measures.
    pub fn observable(&self) -> &Observable {
        &self.measurement.observables[self.bin]
    }

    /// Magnitude of `source` for this entry.
    pub fn magnitude(&self, source: &str) -> f64 {
        self.measurement.magnitude(source, self.bin)
    }
}
