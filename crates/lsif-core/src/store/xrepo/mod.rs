//! Cross-repository package index and the resolution built on it.

pub mod catalog;
pub mod resolver;

pub use catalog::XrepoDatabase;
