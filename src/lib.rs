//! Headless core of the SKF violations dashboard: load the incident dataset,
//! filter it by country, year and month, and compute the tables behind each
//! dashboard section.

pub mod config;
pub mod data;
pub mod state;
pub mod table;
pub mod views;
