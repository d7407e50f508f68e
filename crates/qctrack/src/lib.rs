//! `qctrack` - Quality-control test tracker for network equipment
//!
//! This library provides the core functionality for registering ONUs and
//! routers, recording their QC test runs, searching the results and exporting
//! reports, along with the web front end that drives it all.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod activity;
pub mod cli;
pub mod config;
pub mod equipment;
pub mod error;
pub mod history;
pub mod logging;
pub mod report;
pub mod search;
pub mod storage;
pub mod templates;
pub mod user;
pub mod web;

pub use config::Config;
pub use equipment::{Equipment, EquipmentStatus, TestOutcome, TestRecord};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
pub use user::{Role, User};
