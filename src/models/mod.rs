pub mod base_model;
pub mod gmm;
pub mod selection;
