//! Resumable acquisition of research-paper PDFs for a catalog of DOIs.
//!
//! Each DOI maps to one canonical file in the save directory
//! ([`filename::canonical_filename`]). Missing files are fetched through a
//! [`chain::StrategyChain`]: an external downloader first, then a direct
//! doi.org landing-page scrape. [`app::App::run`] drives the chain over a
//! [`catalog::Catalog`] and records a `Y`/`N` status per row.

pub mod app;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod direct;
pub mod domain;
pub mod error;
pub mod external_tool;
pub mod filename;
pub mod fs_util;
pub mod output;
pub mod store;
pub mod strategy;
