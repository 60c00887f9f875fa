//! A library for Metamath-style proof databases: incremental scanning into
//! zones, scope checking, grammar-based formula parsing and proof
//! verification.  The entry point for all API operations is in the `database`
//! module, as is a discussion of the data representation.

pub use fnv;

mod bit_set;
mod tree;
mod util;

pub mod abr;
pub mod database;
pub mod diag;
pub mod formula;
pub mod grammar;
pub mod line_cache;
pub mod scanner;
pub mod scopeck;
pub mod source;
pub mod statement;
pub mod verify;
pub mod zone;

pub use database::{Database, DbOptions};
pub use formula::Formula;
pub use util::as_str;

#[cfg(test)]
mod database_tests;
#[cfg(test)]
mod grammar_tests;
#[cfg(test)]
mod scanner_tests;
#[cfg(test)]
mod scopeck_tests;
#[cfg(test)]
mod source_tests;
#[cfg(test)]
mod verify_tests;
