mod collection;
mod database;

pub use collection::PostgresCollection;
pub use database::PostgresStore;
