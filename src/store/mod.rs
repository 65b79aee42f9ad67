//! Store module - Postgres-backed persistence for the decision engine

pub mod postgres;

pub use postgres::PgStore;
