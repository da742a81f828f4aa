pub mod api;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod web;
