pub mod blocks;
pub mod macros;
