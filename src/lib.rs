//! gator: a multi-user RSS aggregator backed by SQLite.
//!
//! - [`feed`] - fetching, parsing and date normalization
//! - [`ingest`] - the scheduler behind `gator agg`
//! - [`storage`] - users, feeds, follows and posts
//! - [`config`] - `~/.config/gator/config.toml`
//! - [`commands`] - the CLI subcommands

pub mod commands;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
