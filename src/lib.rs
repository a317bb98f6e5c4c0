pub mod api;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod logging;
pub mod storage;

pub use application::{LedgerError, LedgerService, ReportEngine};
pub use domain::*;
