//! Type definitions for salesboard

mod error;
mod order;
mod sales;

pub use error::*;
pub use order::*;
pub use sales::*;
