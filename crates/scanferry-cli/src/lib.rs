//! Command-line front end for scanferry.

pub mod app;
pub mod cli;
pub mod config;
