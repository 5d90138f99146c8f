pub mod fs;
pub mod git;
