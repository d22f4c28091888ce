// Application layer - use cases and orchestration on top of the ledger store

pub mod error;
pub mod recurring;
pub mod reporting;
pub mod service;

pub use error::*;
pub use recurring::*;
pub use reporting::*;
pub use service::*;
