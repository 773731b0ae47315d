mod mem;
mod postgres;

pub use mem::{MemCollection, MemStore};
pub use postgres::{PostgresCollection, PostgresStore};
