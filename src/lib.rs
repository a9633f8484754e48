//! OCR post-processing with feedback-driven correction learning
//!
//! Recognized text is corrected against a persisted dictionary, structured
//! fields are validated, and the result is quality-scored. Operator feedback
//! accumulates in a log and recurring corrections are promoted back into the
//! dictionary.

pub mod config;
pub mod correction;
pub mod engine;
pub mod engines;
pub mod error;
pub mod feedback;
pub mod learning;
pub mod pipeline;
pub mod quality;
pub mod server;
pub mod storage;
pub mod validation;
