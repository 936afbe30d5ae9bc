pub mod console;
pub mod coordinator;
pub mod report;
pub mod scanner;
pub mod start_bot;
pub mod submitter;
