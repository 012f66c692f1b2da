use super::backend::{FaerBackend, GaussBackend, LinearBackend};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Simple registry of available linear backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gauss,
    Faer,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "gauss" | "default" => Ok(BackendKind::Gauss),
            "faer" => Ok(BackendKind::Faer),
            other => Err(anyhow!(
                "unknown backend '{}'; supported values: {}",
                other,
                BackendKind::available().join(", ")
            )),
        }
    }
}

impl BackendKind {
    pub fn build_backend(self) -> Arc<dyn LinearBackend> {
        match self {
            BackendKind::Gauss => Arc::new(GaussBackend),
            BackendKind::Faer => Arc::new(FaerBackend),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["gauss", "faer"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gauss => "gauss",
            BackendKind::Faer => "faer",
        }
    }
}
