//! Reusable library components of the competition core.

pub mod archive;
pub mod bus;
pub mod cache;
pub mod db;
pub mod domain;
pub mod feed;
pub mod ledger;
pub mod service;
