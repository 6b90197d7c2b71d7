pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod storage;
pub mod users;
pub mod views;
