//! OCR engine implementations
//!
//! Engines are conditionally compiled based on feature flags and collected in
//! an [`EngineRegistry`]; the first available engine is the default.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

#[cfg(any(feature = "engine-ocrs", feature = "engine-leptess"))]
mod models;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::OcrError;
use serde::Serialize;
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

/// Registry of available OCR engines
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl EngineRegistry {
    /// Initialize every engine compiled into this build
    #[allow(unused_mut, unused_variables)]
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let mut engines: Vec<Arc<dyn OcrEngine>> = Vec::new();

        #[cfg(feature = "engine-ocrs")]
        engines.push(Arc::new(ocrs::OcrsEngine::new(config)?));

        #[cfg(feature = "engine-leptess")]
        engines.push(Arc::new(leptess::LeptessEngine::new(config)?));

        Self::from_engines(engines)
    }

    /// Registry over already constructed engines, first one is the default
    pub fn from_engines(engines: Vec<Arc<dyn OcrEngine>>) -> Result<Self, OcrError> {
        if engines.is_empty() {
            return Err(OcrError::InitializationError(
                "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess".to_string(),
            ));
        }
        Ok(Self { engines })
    }

    /// The default engine
    pub fn default_engine(&self) -> Arc<dyn OcrEngine> {
        Arc::clone(&self.engines[0])
    }

    /// Get info about all available engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
                supported_languages: e.supported_languages(),
            })
            .collect()
    }
}
