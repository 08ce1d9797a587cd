//! Domain records and the collaborator stores that own them

pub mod conversation;
pub mod identity;
pub mod profile;
pub mod search;
