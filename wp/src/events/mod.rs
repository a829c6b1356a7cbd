//! Session event bus
//!
//! The workflow emits a [`SessionEvent`] for every transition, ledger append
//! and execution step. Observers (the REPL's live progress line, tests)
//! subscribe to the bus; nobody is required to listen.
//!
//! ```text
//!   Workflow (worker runtime) --emit--> broadcast --> REPL progress printer
//!                                                \--> test subscribers
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::{EventRecord, SessionEvent};
