pub mod attendance;
pub mod audit_log;
pub mod company;
pub mod employee;
pub mod role;
pub mod user;
