//! Cross-validated fitting: fold partitioning, per-label model selection
//! and reassembly of held-out scores.

pub mod partition;
pub mod runner;
pub mod table;
