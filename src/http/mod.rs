//! HTTP surface: throttle middleware and the guard server.

mod middleware;
mod routes;
mod server;

pub use middleware::{
    throttle, ThrottleState, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET,
    THROTTLED_MESSAGE,
};
pub use routes::status_routes;
pub use server::HttpServer;
