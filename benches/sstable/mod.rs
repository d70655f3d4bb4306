pub mod block;
pub mod bloom;
