pub mod atomic_write;
pub mod hash;
pub mod keyed_mutex;
pub mod validation;
