mod posts;
mod repository;
mod schema;

pub use posts::Claim;
pub use repository::Repository;
