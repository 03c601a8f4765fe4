pub mod block_source;

pub use block_source::{read_block, BlockSource};
