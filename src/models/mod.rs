// Data models (structs)
pub mod genome;
pub mod job;
pub mod settings;

pub use genome::*;
pub use job::*;
pub use settings::*;
