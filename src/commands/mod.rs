pub mod db;
pub mod forecast;
pub mod ledger;
pub mod settings;
pub mod surveillance;
pub mod watcher;
