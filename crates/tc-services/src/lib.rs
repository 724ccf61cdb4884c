//! # tc-services
//!
//! Application services built on the `tc-core` ports: the capsule service,
//! the unlock poller and store combinators.

pub mod admin;
pub mod capsule;
pub mod poller;
pub mod storage;

pub use admin::OpenAdmin;
pub use capsule::CapsuleService;
pub use poller::{PollerHandle, UnlockPoller};
pub use storage::FallbackFileStore;
