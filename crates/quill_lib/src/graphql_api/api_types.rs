use anyhow::Context as _;
use async_graphql::{Context, Object, Result};
use quill_common_types::MemberTypeId;
use quill_store::models;
use uuid::Uuid;

use super::ctx_data;

/// A membership tier, with the perks that come with it.
#[derive(Clone, derive_more::From)]
pub struct MemberType {
    model: models::MemberType,
}

#[Object]
impl MemberType {
    async fn id(&self) -> MemberTypeId {
        self.model.id
    }

    async fn discount(&self) -> f64 {
        self.model.discount
    }

    async fn posts_limit_per_month(&self) -> i32 {
        self.model.posts_limit_per_month
    }
}

#[derive(Clone, derive_more::From)]
pub struct User {
    model: models::User,
}

#[Object]
impl User {
    async fn id(&self) -> Uuid {
        self.model.id
    }

    async fn name(&self) -> &str {
        self.model.name.as_str()
    }

    async fn balance(&self) -> f64 {
        self.model.balance
    }

    async fn profile(&self, ctx: &Context<'_>) -> Result<Option<Profile>> {
        let ctx_data = ctx_data(ctx);
        let profile = ctx_data.store.profile_by_user(self.model.id).await?;

        Ok(profile.map(Into::into))
    }

    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        let ctx_data = ctx_data(ctx);
        let posts = ctx_data.store.posts_by_author(self.model.id).await?;

        Ok(posts.into_iter().map(Into::into).collect())
    }

    /// Users whose posts this user is subscribed to.
    async fn user_subscribed_to(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        let ctx_data = ctx_data(ctx);
        let authors = ctx_data.store.subscribed_authors(self.model.id).await?;

        Ok(authors.into_iter().map(Into::into).collect())
    }

    /// Users subscribed to this user's posts.
    async fn subscribed_to_user(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        let ctx_data = ctx_data(ctx);
        let subscribers = ctx_data.store.subscribers(self.model.id).await?;

        Ok(subscribers.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, derive_more::From)]
pub struct Profile {
    model: models::Profile,
}

#[Object]
impl Profile {
    async fn id(&self) -> Uuid {
        self.model.id
    }

    async fn is_male(&self) -> bool {
        self.model.is_male
    }

    async fn year_of_birth(&self) -> i32 {
        self.model.year_of_birth
    }

    async fn member_type(&self, ctx: &Context<'_>) -> Result<MemberType> {
        let ctx_data = ctx_data(ctx);
        let member_type = ctx_data
            .store
            .member_type(self.model.member_type_id)
            .await?
            .with_context(|| format!("member type {} not found", self.model.member_type_id))?;

        Ok(member_type.into())
    }
}

#[derive(Clone, derive_more::From)]
pub struct Post {
    model: models::Post,
}

#[Object]
impl Post {
    async fn id(&self) -> Uuid {
        self.model.id
    }

    async fn title(&self) -> &str {
        self.model.title.as_str()
    }

    async fn content(&self) -> &str {
        self.model.content.as_str()
    }
}
