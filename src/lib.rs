pub mod config;
pub mod forest;
pub mod ident;
pub mod snapshot;
pub mod studio;
#[doc(hidden)]
pub mod test_support;
