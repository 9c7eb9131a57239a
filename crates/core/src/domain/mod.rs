pub mod chunk;
pub mod output;
