pub mod paths;
pub mod settings;
pub mod store;

pub use paths::*;
pub use settings::*;
pub use store::*;
