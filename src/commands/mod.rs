pub mod bib;
pub mod build;
pub mod cache;
pub mod parse;
pub mod parse_log;

pub use bib::*;
pub use build::*;
pub use cache::*;
pub use parse::*;
pub use parse_log::*;
