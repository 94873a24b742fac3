//! # mockd graphql
//!
//! The GraphQL adapter: compiles an endpoint's SDL into an executable
//! schema, resolves fields from the configured `Type.field` resolver map
//! (templated responses or structured errors), synthesizes plausible leaves
//! for everything else, and gates introspection behind the endpoint flag.

pub mod handler;
pub mod schema;

pub use handler::{GraphqlDispatcher, GraphqlHook};
pub use schema::build_schema;
