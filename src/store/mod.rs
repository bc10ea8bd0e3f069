mod keys;
mod kv;
mod mem;
pub use keys::*;
pub use kv::*;
pub use mem::*;
