pub mod cookie;
pub mod http_client;
pub mod interpolate;
pub mod query;
pub mod time;
