mod conv_block;
mod decoder;
mod encoder;

pub use conv_block::*;
pub use decoder::*;
pub use encoder::*;
