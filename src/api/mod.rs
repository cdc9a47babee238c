pub mod error;
pub mod handler_utils;
pub mod proxy;
pub mod response;
pub mod server;
