//! Incident and vote persistence.
//!
//! `IncidentStore` is the contract the engine depends on. `PgIncidentStore`
//! is the production implementation; `MemoryIncidentStore` backs tests.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryIncidentStore;
pub use postgres::PgIncidentStore;
pub use traits::{IncidentStore, VoteTransaction};
