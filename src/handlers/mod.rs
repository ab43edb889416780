//! Handlers invoked for dispatched routes.

pub mod custom;
pub mod entity;
pub use custom::{CustomHandler, RouteRequest, RouteResponse};
pub use entity::handle;
