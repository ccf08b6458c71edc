//! Domain logic for managed-disk snapshots: resource ids, snapshot naming,
//! and retention planning. No I/O here; the `azsnapctl` binary wires these
//! into the management API.

pub mod model;
pub mod naming;
pub mod retention;

pub use model::*;
pub use naming::*;
pub use retention::*;
