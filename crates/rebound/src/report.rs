pub mod json;
pub mod stream;
pub mod table;
mod types;
