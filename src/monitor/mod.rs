pub mod watcher;
pub mod wayland;

pub use watcher::*;
pub use wayland::*;
