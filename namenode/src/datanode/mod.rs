pub mod selection_policy;
pub mod service;
