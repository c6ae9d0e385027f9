#![forbid(unsafe_code)]

pub mod app;
pub mod audit;
pub mod billing;
pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod events;
mod fs_json;
pub mod generation;
pub mod guard;
pub mod llm;
pub mod logging;
pub mod progress;
