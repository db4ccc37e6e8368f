pub mod app;
pub mod archive;
pub mod arxiv;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod paths;
pub mod presets;
pub mod query;
