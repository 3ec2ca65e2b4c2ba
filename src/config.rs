use serde::{Deserialize, Serialize};

use crate::error::{CvError, Result};

/// Parameters of a cross-validated mixture run.
///
/// Component counts are searched over `[min_components, max_components)`,
/// clipped to the number of training points of each cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub min_components: usize,
    pub max_components: usize,
    /// Training sets larger than this are uniformly subsampled without replacement.
    pub subsample_cap: usize,
    /// Seed for subsampling and EM initialisation. `None` draws one per run.
    pub random_state: Option<u64>,
    pub parallel: bool,
    /// Worker threads when `parallel` is set. `None` uses every core.
    pub n_threads: Option<usize>,
    pub tolerance: f64,
    pub max_n_iterations: u64,
    pub n_runs: u64,
    pub reg_covariance: f64,
}

impl Default for CvConfig {
    fn default() -> Self {
        CvConfig {
            min_components: 2,
            max_components: 20,
            subsample_cap: 10_000,
            random_state: None,
            parallel: false,
            n_threads: None,
            tolerance: 1e-3,
            max_n_iterations: 100,
            n_runs: 1,
            reg_covariance: 1e-6,
        }
    }
}

impl CvConfig {
    pub fn with_components(mut self, min_components: usize, max_components: usize) -> Self {
        self.min_components = min_components;
        self.max_components = max_components;
        self
    }

    pub fn with_subsample_cap(mut self, cap: usize) -> Self {
        self.subsample_cap = cap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_n_iterations(mut self, max_n_iterations: u64) -> Self {
        self.max_n_iterations = max_n_iterations;
        self
    }

    pub fn with_n_runs(mut self, n_runs: u64) -> Self {
        self.n_runs = n_runs;
        self
    }

    pub fn with_reg_covariance(mut self, reg_covariance: f64) -> Self {
        self.reg_covariance = reg_covariance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_components == 0 {
            return Err(CvError::InvalidConfig(
                "min_components must be at least 1".into(),
            ));
        }
        if self.min_components >= self.max_components {
            return Err(CvError::InvalidConfig(format!(
                "component range [{}, {}) is empty",
                self.min_components, self.max_components
            )));
        }
        if self.subsample_cap < self.min_components {
            return Err(CvError::InvalidConfig(format!(
                "subsample_cap {} is below min_components {}",
                self.subsample_cap, self.min_components
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(CvError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.reg_covariance < 0.0 {
            return Err(CvError::InvalidConfig(format!(
                "reg_covariance must be non-negative, got {}",
                self.reg_covariance
            )));
        }
        if self.max_n_iterations == 0 || self.n_runs == 0 {
            return Err(CvError::InvalidConfig(
                "max_n_iterations and n_runs must be positive".into(),
            ));
        }
        if self.n_threads == Some(0) {
            return Err(CvError::InvalidConfig("n_threads must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.n_threads.unwrap_or_else(num_cpus::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: CvConfig =
            serde_json::from_str(r#"{"max_components": 6, "random_state": 9}"#).unwrap();
        assert_eq!(config.max_components, 6);
        assert_eq!(config.random_state, Some(9));
        assert_eq!(config.min_components, 2);
        assert!(config.validate().is_ok());

        let json = serde_json::to_string(&config).unwrap();
        let back: CvConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn defaults_validate() {
        let config = CvConfig::default();
        assert_eq!(config.min_components, 2);
        assert_eq!(config.max_components, 20);
        assert_eq!(config.subsample_cap, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_range() {
        let config = CvConfig::default().with_components(4, 4);
        assert!(matches!(config.validate(), Err(CvError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_components_and_threads() {
        assert!(CvConfig::default().with_components(0, 3).validate().is_err());
        assert!(CvConfig::default().with_n_threads(0).validate().is_err());
        assert!(CvConfig::default().with_subsample_cap(1).validate().is_err());
    }

    #[test]
    fn thread_count_falls_back_to_cores() {
        assert_eq!(CvConfig::default().with_n_threads(3).thread_count(), 3);
        assert!(CvConfig::default().thread_count() >= 1);
    }
}
