pub mod cli;
pub mod engine;
pub mod modules;
pub mod storage;
