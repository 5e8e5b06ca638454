use anyhow::Context as _;
use async_graphql::{Context, Object, Result};
use quill_common_types::MemberTypeId;
use uuid::Uuid;

use super::{api_types, ctx_data};

pub struct QueryRoot;

#[Object(name = "RootQueryType")]
impl QueryRoot {
    async fn member_types(&self, ctx: &Context<'_>) -> Result<Vec<api_types::MemberType>> {
        let ctx_data = ctx_data(ctx);
        let member_types = ctx_data.store.member_types().await?;

        Ok(member_types.into_iter().map(Into::into).collect())
    }

    /// Fails if no member type with the given id exists.
    async fn member_type(
        &self,
        ctx: &Context<'_>,
        id: MemberTypeId,
    ) -> Result<api_types::MemberType> {
        let ctx_data = ctx_data(ctx);
        let member_type = ctx_data
            .store
            .member_type(id)
            .await?
            .with_context(|| format!("member type {} not found", id))?;

        Ok(member_type.into())
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<api_types::User>> {
        let ctx_data = ctx_data(ctx);
        let users = ctx_data.store.users().await?;

        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn user(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<api_types::User>> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.user(id).await?.map(Into::into))
    }

    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<api_types::Post>> {
        let ctx_data = ctx_data(ctx);
        let posts = ctx_data.store.posts().await?;

        Ok(posts.into_iter().map(Into::into).collect())
    }

    async fn post(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<api_types::Post>> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.post(id).await?.map(Into::into))
    }

    async fn profiles(&self, ctx: &Context<'_>) -> Result<Vec<api_types::Profile>> {
        let ctx_data = ctx_data(ctx);
        let profiles = ctx_data.store.profiles().await?;

        Ok(profiles.into_iter().map(Into::into).collect())
    }

    async fn profile(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<api_types::Profile>> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.profile(id).await?.map(Into::into))
    }
}
