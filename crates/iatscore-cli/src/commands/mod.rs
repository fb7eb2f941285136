pub mod analyze;
pub mod init;
pub mod render;
pub mod request;
pub mod serve;
pub mod validate;
