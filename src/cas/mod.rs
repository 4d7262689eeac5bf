//! CAS protocol wire formats.

pub mod response;

pub use response::{plain_validate, CasResponse, FailureCode};
