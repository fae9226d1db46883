//! Common traits and helpers used across the echoservice library

pub mod test_utils;
pub mod traits;

pub use test_utils::spawn_test_server;
pub use traits::EchoServerTrait;
