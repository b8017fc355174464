pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;
pub mod update;

pub use error::*;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::*;
