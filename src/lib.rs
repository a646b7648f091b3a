pub mod cleaner;
pub mod config;
pub mod controller;
pub mod decision;
pub mod domain;
pub mod error;
pub mod event;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod objects;
pub mod observability;
pub mod parser;
pub mod store;
