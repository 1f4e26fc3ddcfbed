pub mod approval;
pub mod execution;
pub mod order;
pub mod rules;
