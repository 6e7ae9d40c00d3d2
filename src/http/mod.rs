pub mod handlers;
pub mod routes;
pub mod types;
mod tests;

pub use handlers::*;
pub use routes::*;
pub use types::*;
