pub mod alert;
pub mod assessment;
pub mod catalog;
pub mod forecast;
pub mod surveillance;
pub mod thresholds;
pub mod transaction;
