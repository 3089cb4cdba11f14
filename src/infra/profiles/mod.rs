// Implementations of the profile ports.

pub mod in_memory;
pub mod postgres_store;

// Re-export for convenience
pub use in_memory::InMemoryProfileStore;
pub use postgres_store::{PgChangeFeed, PostgresProfileStore};
