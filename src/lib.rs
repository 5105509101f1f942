// Library crate exposing modules for integration tests

pub mod error;
pub mod model;
pub mod reconciler;
pub mod resolvers;
pub mod rewirer;
pub mod store;
pub mod util;
