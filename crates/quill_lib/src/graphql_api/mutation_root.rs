use async_graphql::{Context, Object, Result};
use quill_common_types::inputs;
use quill_store::models::{PostChangeset, ProfileChangeset, UserChangeset};
use uuid::Uuid;

use super::{api_types, ctx_data};

pub struct MutationRoot;

#[Object(name = "Mutations")]
impl MutationRoot {
    async fn create_user(
        &self,
        ctx: &Context<'_>,
        dto: inputs::CreateUserInput,
    ) -> Result<api_types::User> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.create_user(&dto).await?.into())
    }

    /// Creates the profile of an existing user. A user has at most one
    /// profile.
    async fn create_profile(
        &self,
        ctx: &Context<'_>,
        dto: inputs::CreateProfileInput,
    ) -> Result<api_types::Profile> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.create_profile(&dto).await?.into())
    }

    async fn create_post(
        &self,
        ctx: &Context<'_>,
        dto: inputs::CreatePostInput,
    ) -> Result<api_types::Post> {
        let ctx_data = ctx_data(ctx);
        Ok(ctx_data.store.create_post(&dto).await?.into())
    }

    /// Fields left out of `dto` keep their current value.
    async fn change_post(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        dto: inputs::ChangePostInput,
    ) -> Result<api_types::Post> {
        let ctx_data = ctx_data(ctx);
        let post = ctx_data
            .store
            .update_post(id, PostChangeset::from(dto))
            .await?;

        Ok(post.into())
    }

    async fn change_profile(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        dto: inputs::ChangeProfileInput,
    ) -> Result<api_types::Profile> {
        let ctx_data = ctx_data(ctx);
        let profile = ctx_data
            .store
            .update_profile(id, ProfileChangeset::from(dto))
            .await?;

        Ok(profile.into())
    }

    async fn change_user(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        dto: inputs::ChangeUserInput,
    ) -> Result<api_types::User> {
        let ctx_data = ctx_data(ctx);
        let user = ctx_data
            .store
            .update_user(id, UserChangeset::from(dto))
            .await?;

        Ok(user.into())
    }

    /// Deletes a user together with their profile, posts and subscriptions.
    async fn delete_user(&self, ctx: &Context<'_>, id: Uuid) -> Result<String> {
        let ctx_data = ctx_data(ctx);
        ctx_data.store.delete_user(id).await?;

        Ok("User deleted successfully".to_string())
    }

    async fn delete_post(&self, ctx: &Context<'_>, id: Uuid) -> Result<String> {
        let ctx_data = ctx_data(ctx);
        ctx_data.store.delete_post(id).await?;

        Ok("Post deleted successfully".to_string())
    }

    async fn delete_profile(&self, ctx: &Context<'_>, id: Uuid) -> Result<String> {
        let ctx_data = ctx_data(ctx);
        ctx_data.store.delete_profile(id).await?;

        Ok("Profile deleted successfully".to_string())
    }

    /// Subscribes `user_id` to the posts of `author_id`.
    async fn subscribe_to(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<String> {
        let ctx_data = ctx_data(ctx);
        ctx_data.store.subscribe(user_id, author_id).await?;

        Ok("Subscribed successfully".to_string())
    }

    async fn unsubscribe_from(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<String> {
        let ctx_data = ctx_data(ctx);
        ctx_data.store.unsubscribe(user_id, author_id).await?;

        Ok("Unsubscribed successfully".to_string())
    }
}
