pub mod http_master;
pub mod lan;
pub mod master;
