//! Live session orchestration
//!
//! The session controller, the opaque remote-transport seam, and the
//! in-process loopback transport used for hardware-only runs and tests.

pub mod loopback;
pub mod session;
pub mod transport;

pub use loopback::LoopbackTransport;
pub use session::{SessionController, SessionState};
pub use transport::{LiveSession, LiveTransport, SessionEvent};
