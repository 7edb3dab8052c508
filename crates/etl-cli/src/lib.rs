//! Command line front end for the capture-data load engine.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
