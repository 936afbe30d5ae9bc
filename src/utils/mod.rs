pub mod link;
pub mod time;
