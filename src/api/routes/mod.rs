pub mod health;
pub mod quota;
pub mod users;
