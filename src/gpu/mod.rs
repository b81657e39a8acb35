pub mod process;
pub mod report;
