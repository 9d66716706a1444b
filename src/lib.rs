#![allow(async_fn_in_trait)]
pub mod aoi;
pub mod config;
pub mod diagnostics;
pub mod download;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod orchestrator;
pub mod provider;
pub mod query;
pub mod run;
pub mod run_log;
