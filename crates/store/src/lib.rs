//! Database access (read and write) abstractions for the Quill API.

pub mod models;
mod schema;
mod store;

#[cfg(feature = "tests")]
pub mod test_utils;

pub use store::Store;
