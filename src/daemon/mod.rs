pub mod control;
pub mod lifecycle;
pub mod lock;
pub mod signal;

pub use control::*;
pub use lifecycle::*;
pub use lock::*;
pub use signal::*;
