//! `spnet.toml` handling.
//!
//! ```toml
//! [solver]
//! max_iterations = 100
//! tolerance = 1e-6
//! warm_start = true
//! backend = "faer"
//! ```
//!
//! Every key is optional. Command-line flags win over the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spnet_core::{BackendKind, SolverConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpnetConfig {
    pub solver: SolverConfig,
}

pub fn load_config(path: &Path) -> Result<SpnetConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: SpnetConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// Solver settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SolverOverrides {
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub cold: bool,
    pub backend: Option<String>,
}

impl SolverOverrides {
    pub fn apply(&self, config: &mut SolverConfig) -> Result<()> {
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(tolerance) = self.tolerance {
            anyhow::ensure!(
                tolerance > 0.0,
                "tolerance must be positive, got {tolerance}"
            );
            config.tolerance = tolerance;
        }
        if self.cold {
            config.warm_start = false;
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.parse::<BackendKind>()?;
        }
        Ok(())
    }
}

/// Configuration file if any, then the overrides.
pub fn resolve_solver_config(
    path: Option<&Path>,
    overrides: &SolverOverrides,
) -> Result<SolverConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?.solver,
        None => SolverConfig::default(),
    };
    overrides.apply(&mut config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SpnetConfig = toml::from_str(
            r#"
            [solver]
            max_iterations = 100
            backend = "faer"
            "#,
        )
        .unwrap();
        assert_eq!(config.solver.max_iterations, 100);
        assert_eq!(config.solver.backend, BackendKind::Faer);
        assert_eq!(config.solver.tolerance, 1e-8);
        assert!(config.solver.warm_start);

        let empty: SpnetConfig = toml::from_str("").unwrap();
        assert_eq!(empty, SpnetConfig::default());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spnet.toml");
        std::fs::write(&path, "[solver]\ntolerance = 1e-4\nwarm_start = true\n").unwrap();

        let overrides = SolverOverrides {
            tolerance: Some(1e-6),
            cold: true,
            ..Default::default()
        };
        let config = resolve_solver_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.tolerance, 1e-6);
        assert!(!config.warm_start);
        assert_eq!(config.max_iterations, 50);
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        let mut config = SolverConfig::default();
        let backend = SolverOverrides {
            backend: Some("cholesky".to_string()),
            ..Default::default()
        };
        assert!(backend.apply(&mut config).is_err());

        let tolerance = SolverOverrides {
            tolerance: Some(0.0),
            ..Default::default()
        };
        assert!(tolerance.apply(&mut config).is_err());
    }

    #[test]
    fn test_unreadable_config_names_the_file() {
        let err = load_config(Path::new("/nonexistent/spnet.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/spnet.toml"));
    }
}
