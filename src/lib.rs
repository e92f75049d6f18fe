// Library for tests to access modules

pub mod aggregator;
pub mod broadcaster;
pub mod config;
pub mod health;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod version;
pub mod worker;
