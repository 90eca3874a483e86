pub mod controller;
pub mod state;

pub use controller::{SessionController, SessionReport};
pub use state::SessionState;
