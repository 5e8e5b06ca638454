use diesel::{AsChangeset, Insertable, Queryable, Selectable};
use quill_common_types::{inputs, MemberTypeId};
use serde::Serialize;
use uuid::Uuid;

use super::schema::*;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = member_types)]
pub struct MemberType {
    pub id: MemberTypeId,
    pub discount: f64,
    pub posts_limit_per_month: i32,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub balance: f64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub balance: f64,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub name: Option<String>,
    pub balance: Option<f64>,
}

impl UserChangeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.balance.is_none()
    }
}

impl From<inputs::ChangeUserInput> for UserChangeset {
    fn from(input: inputs::ChangeUserInput) -> Self {
        Self {
            name: input.name,
            balance: input.balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub is_male: bool,
    pub year_of_birth: i32,
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub is_male: bool,
    pub year_of_birth: i32,
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = profiles)]
pub struct ProfileChangeset {
    pub is_male: Option<bool>,
    pub year_of_birth: Option<i32>,
    pub member_type_id: Option<MemberTypeId>,
}

impl ProfileChangeset {
    pub fn is_empty(&self) -> bool {
        self.is_male.is_none() && self.year_of_birth.is_none() && self.member_type_id.is_none()
    }
}

impl From<inputs::ChangeProfileInput> for ProfileChangeset {
    fn from(input: inputs::ChangeProfileInput) -> Self {
        Self {
            is_male: input.is_male,
            year_of_birth: input.year_of_birth,
            member_type_id: input.member_type_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub content: &'a str,
    pub author_id: Uuid,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = posts)]
pub struct PostChangeset {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PostChangeset {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

impl From<inputs::ChangePostInput> for PostChangeset {
    fn from(input: inputs::ChangePostInput) -> Self {
        Self {
            title: input.title,
            content: input.content,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = subscribers_on_authors)]
pub struct NewSubscription {
    pub subscriber_id: Uuid,
    pub author_id: Uuid,
}
