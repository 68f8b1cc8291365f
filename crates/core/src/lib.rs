//! RelayCraft Core Types
//!
//! Sessions, proofs, evidence and relay messages shared by every RelayCraft
//! crate, plus the narrow traits through which the servicer talks to the
//! stake ledger, consensus, hosted chains and metrics.

mod error;
mod evidence;
mod interfaces;
mod relay;
mod types;

pub use error::*;
pub use evidence::*;
pub use interfaces::*;
pub use relay::*;
pub use types::*;
