//! rota-core: clinic staff shift assignment with quota fairness.
//!
//! Layers, bottom up:
//!   store        SQLite persistence (the only code that runs SQL)
//!   calendar     month ranges, Sun–Sat weeks, day classification
//!   requirement  doctor roster → per-category slot demand
//!   fairness     cumulative-deviation ledger and leave quotas
//!   context      per-run lookup tables and the assignment book
//!   *_phase      the three assignment phases (pure planners)
//!   engine       runs the phases, one transaction per unit
//!   validation   read-only scan plus bounded auto-repair
//!   snapshot     monthly fairness recompute after deployment
//!   leave        leave submission and serialized approval
//!   schedule     roster application and lifecycle transitions
//!   seed         clinic reference data from JSON
//!   worker       background thread for long scans

pub mod balance_phase;
pub mod calendar;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod fairness;
pub mod fill_phase;
pub mod holiday_phase;
pub mod leave;
pub mod requirement;
pub mod rng;
pub mod schedule;
pub mod seed;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod validation;
pub mod worker;
