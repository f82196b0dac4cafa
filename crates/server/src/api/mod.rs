pub mod batch;
pub mod handlers;
pub mod images;
pub mod middleware;
pub mod rate_limit;
pub mod routes;

pub use routes::create_router;
