pub mod chat;
pub mod kb;
pub mod onboard;
pub mod runtime;
