//! GraphQL API types shared between the store and the API server.
//!
//! Only the types that are both persisted and exposed over GraphQL live here;
//! output objects are defined next to their resolvers.

pub mod inputs;
mod member_type_id;

pub use member_type_id::MemberTypeId;
pub use uuid::Uuid;
