pub mod conversations;
pub mod logs;
pub mod reindex;
pub mod search;
pub mod status;
pub mod sync;
