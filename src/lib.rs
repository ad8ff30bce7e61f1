//! Parsing and analysis of robot controller `LOGDATA.DAT` logs.
//!
//! Text flows through [`parse`] into records, through [`classify`] into typed
//! events, and from there into [`analyze`] (daily operating rates) and
//! [`compare`] (absolute-position and tool-offset deltas). [`report`] joins
//! these with the tabular collaborators from [`source`] into one [`report::Report`].

pub mod analyze;
pub mod classify;
pub mod compare;
pub mod config;
pub mod error;
pub mod model;
pub mod parse;
pub mod report;
pub mod source;
pub mod viz;
#[cfg(feature = "gui")] pub mod ui;
