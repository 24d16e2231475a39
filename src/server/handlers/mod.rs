pub mod agent;
pub mod health;
pub mod index;
pub mod sessions;
