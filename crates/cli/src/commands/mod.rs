pub mod ask;
pub mod generate;
pub mod init;
pub mod pricing;
pub mod quota;
pub mod resolve;
