//! the test_utils folder here will share utils or test components between
//! the unit tests of every module
mod common;
mod invoker;

pub use common::*;
pub use invoker::*;
