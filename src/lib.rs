pub mod config;
pub mod gimbal;
pub mod predict;
pub mod session;
