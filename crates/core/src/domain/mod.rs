pub mod capability;
pub mod message;
pub mod role;
pub mod task;
