//! Period-bucketed KPIs, category trends, risk scoring and Pareto ranking
//! over IT incident logs.

pub mod calendar;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod kpi;
pub mod matrix;
pub mod models;
pub mod pareto;
pub mod period;
pub mod report;
pub mod risk;
pub mod store;
pub mod trend;
