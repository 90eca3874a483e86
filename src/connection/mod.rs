pub mod state;
pub mod supervisor;

pub use state::{ConnectionState, ConnectionStatus};
pub use supervisor::{ConnectionSnapshot, ConnectionSupervisor};
