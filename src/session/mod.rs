pub mod data;
pub mod error;
pub mod store;

pub use data::{AuthSession, SessionData};
pub use store::SessionStore;
