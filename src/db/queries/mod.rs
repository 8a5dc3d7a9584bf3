pub mod storage;
pub mod thing;
