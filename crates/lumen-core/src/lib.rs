//! Core Lumen library (content rendering, streaming, step runs, config).

pub mod affordance;
pub mod bridge;
pub mod config;
pub mod effects;
pub mod markdown;
pub mod math;
pub mod notation;
pub mod reasoning;
pub mod render;
pub mod steps;
pub mod stream;
pub mod surface;
pub mod verbatim;
