pub mod matching;
pub mod settle;
