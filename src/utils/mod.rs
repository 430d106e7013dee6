pub mod bundle;
pub mod csv;
pub mod fasta;
pub mod paths;

pub use paths::*;
