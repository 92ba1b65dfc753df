pub mod backend;
pub mod focus;

pub use backend::*;
pub use focus::*;
