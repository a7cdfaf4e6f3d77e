//! Core types: schedule, observation masks, model state and square-root primitives

pub mod mask;
pub mod schedule;
pub mod state;
pub mod transforms;
