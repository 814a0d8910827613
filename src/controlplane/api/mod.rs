//! API Module
//!
//! REST rendition of the lifecycle protocol and the server that hosts it.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
