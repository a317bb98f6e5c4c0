// Application layer - use cases and orchestration.
// The service owns every write and its locking; the report engine only reads.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
