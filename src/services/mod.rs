pub mod feeds;
pub mod http;
pub mod init;
pub mod proxy;
pub mod registry;
pub mod sync;
