//! Session engine for planning poker: session and story lifecycle, host
//! authorization, blind voting and reveal, with every committed change pushed
//! through the [`NotificationHub`](pokie_gateway::NotificationHub).

pub mod engine;
pub mod error;
pub mod estimate;
pub mod locks;
pub mod timer;

pub use engine::{DEFAULT_STORE_TIMEOUT, Reveal, SessionEngine};
pub use error::EngineError;
