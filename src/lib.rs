pub mod applier;
pub mod cli;
pub mod config;
pub mod differ;
pub mod error;
pub mod hash;
pub mod logging;
pub mod path_util;
pub mod persistence;
pub mod records;
pub mod stats;
pub mod tree;
pub mod util;
pub mod walker;

#[cfg(test)]
mod util_tests;
