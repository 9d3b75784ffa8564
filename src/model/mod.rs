pub mod device;
pub mod topic;
pub mod user;
