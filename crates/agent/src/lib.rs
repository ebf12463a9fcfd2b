//! Power output prediction service
//!
//! HTTP surface over [`predictor_lib::Predictor`] plus health and metrics
//! endpoints.

pub mod api;
pub mod config;
