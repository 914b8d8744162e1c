//! Text processing utilities.

pub mod chunking;

pub use chunking::TextChunker;
