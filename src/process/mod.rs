//! Transfer Process Entity
//!
//! # State Machine
//!
//! ```text
//! INITIAL → PROVISIONING → PROVISIONED → REQUESTING → REQUESTED → IN_PROGRESS
//!                               └──────────────────────────────────┘   │
//!                                                     STREAMING ← ─────┤
//!                                                         └──→ COMPLETED
//! COMPLETED → DEPROVISIONING → DEPROVISIONED → ENDED
//!
//! any non-terminal state → ERROR | CANCELLED
//! ```
//!
//! ENDED, CANCELLED and ERROR are terminal.

pub mod error;
pub mod state;
pub mod types;

pub use error::ProcessError;
pub use state::TransferProcessState;
pub use types::{ProcessType, TransferProcess, TransferProcessId};
