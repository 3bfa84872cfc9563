pub mod reservation;
pub mod route;
pub mod trip;
pub mod user;
pub mod vehicle;
