//! Input objects accepted by the mutations of the GraphQL API.
//!
//! `Create*` inputs carry every column; `Change*` inputs are partial, and a
//! missing field leaves the stored value untouched.

use async_graphql::InputObject;
use uuid::Uuid;

use crate::MemberTypeId;

#[derive(Debug, Clone, InputObject)]
pub struct CreateUserInput {
    pub name: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct ChangeUserInput {
    pub name: Option<String>,
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, InputObject)]
pub struct CreateProfileInput {
    pub is_male: bool,
    pub year_of_birth: i32,
    /// The user this profile belongs to. A user has at most one profile.
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct ChangeProfileInput {
    pub is_male: Option<bool>,
    pub year_of_birth: Option<i32>,
    pub member_type_id: Option<MemberTypeId>,
}

#[derive(Debug, Clone, InputObject)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct ChangePostInput {
    pub title: Option<String>,
    pub content: Option<String>,
}
