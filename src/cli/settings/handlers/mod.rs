//! Setting handlers for different configuration patterns.

pub mod backend_keyed;
pub mod numeric;
pub mod simple;

pub use backend_keyed::*;
pub use numeric::*;
pub use simple::*;
