pub mod chat;
pub mod paper;
pub mod sessions;
