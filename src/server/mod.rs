pub mod acceptor;
pub mod shutdown;
pub mod sweeper;

pub use acceptor::{Acceptor, ServerState};
pub use shutdown::Shutdown;
pub use sweeper::Sweeper;
