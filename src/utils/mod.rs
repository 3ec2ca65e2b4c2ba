pub mod aggregate;
pub mod evaluation;
