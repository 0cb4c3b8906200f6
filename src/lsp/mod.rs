//! Language server front end.

pub mod backend;
pub mod documents;
pub mod prompt;
pub mod workspace;

pub use backend::{Backend, ADD_WORD, IGNORE_WORD, IS_ACCEPTED};
