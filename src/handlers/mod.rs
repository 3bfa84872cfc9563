pub mod admin;
pub mod auth;
pub mod driver;
pub mod profile;
pub mod student;
