//! `mockgate` - Scenario-routed HTTP mock server for end-to-end tests
//!
//! A browser-driven test selects a scenario by navigating to a page with
//! `testCaseId=<id>` in the query string. The [`dispatch`] layer resets the
//! [`server`], installs the [`defaults`] and then the scenario's
//! [`rule`]s, so every backend call the page makes is answered from the
//! [`fixtures`] the scenario chose.

pub mod cli;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod fixtures;
pub mod observability;
pub mod registry;
pub mod rule;
pub mod scenarios;
pub mod server;
pub mod state;
