pub mod atomic;
pub mod history_file;
pub mod persister;

pub use atomic::*;
pub use history_file::*;
pub use persister::*;
