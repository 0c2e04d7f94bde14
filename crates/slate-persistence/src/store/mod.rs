pub mod atomic_writer;
pub mod durable_store;
pub mod file_backend;
pub mod sqlite_backend;

pub use atomic_writer::AtomicWriter;
pub use durable_store::DurableStore;
pub use file_backend::FileBackend;
pub use sqlite_backend::SqliteBackend;
