pub mod dashboard;
pub mod mistakes;
pub mod stations;
