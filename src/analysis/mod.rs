pub mod catalog_check;
pub mod forecast;
pub mod integrity;
pub mod rules;
pub mod sweep;
