pub mod master;
pub mod oob;
pub mod status;
