mod diesel_queries;

use std::fmt::Debug;

use anyhow::{ensure, Context};
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_async_migrations::{embed_migrations, EmbeddedMigrations};
use quill_common_types::{inputs, MemberTypeId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    MemberType, NewPost, NewProfile, NewSubscription, NewUser, Post, PostChangeset, Profile,
    ProfileChangeset, User, UserChangeset,
};
use crate::schema;

/// An abstraction over all database operations. It uses [`Arc`] internally, so
/// it's cheaply cloneable.
///
/// [`Arc`]: std::sync::Arc
#[derive(Clone)]
pub struct Store {
    pool: Pool<AsyncPgConnection>,
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // It might contain sensitive data, so don't print it.
        f.debug_struct("Store").finish()
    }
}

impl Store {
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    /// Connects to the database and runs all pending migrations.
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        info!("Initializing database connection pool");

        let manager = AsyncDieselConnectionManager::new(db_url);
        let pool = Pool::builder(manager).build()?;
        let store = Self { pool };

        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;

        info!("Run database migrations");

        Self::MIGRATIONS
            .run_pending_migrations(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }

    pub async fn conn(&self) -> anyhow::Result<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}

/// Getters.
impl Store {
    pub async fn member_types(&self) -> anyhow::Result<Vec<MemberType>> {
        use schema::member_types;

        Ok(member_types::table
            .select(MemberType::as_select())
            .load(&mut self.conn().await?)
            .await?)
    }

    pub async fn member_type(&self, id: MemberTypeId) -> anyhow::Result<Option<MemberType>> {
        use schema::member_types;

        Ok(member_types::table
            .find(id)
            .select(MemberType::as_select())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?)
    }

    pub async fn users(&self) -> anyhow::Result<Vec<User>> {
        use schema::users;

        Ok(users::table
            .select(User::as_select())
            .load(&mut self.conn().await?)
            .await?)
    }

    pub async fn user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        use schema::users;

        Ok(users::table
            .find(id)
            .select(User::as_select())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?)
    }

    pub async fn posts(&self) -> anyhow::Result<Vec<Post>> {
        use schema::posts;

        Ok(posts::table
            .select(Post::as_select())
            .load(&mut self.conn().await?)
            .await?)
    }

    pub async fn post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        use schema::posts;

        Ok(posts::table
            .find(id)
            .select(Post::as_select())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?)
    }

    /// Returns all posts written by the given user.
    pub async fn posts_by_author(&self, author_id: Uuid) -> anyhow::Result<Vec<Post>> {
        use schema::posts;

        Ok(posts::table
            .filter(posts::author_id.eq(author_id))
            .select(Post::as_select())
            .load(&mut self.conn().await?)
            .await?)
    }

    pub async fn profiles(&self) -> anyhow::Result<Vec<Profile>> {
        use schema::profiles;

        Ok(profiles::table
            .select(Profile::as_select())
            .load(&mut self.conn().await?)
            .await?)
    }

    pub async fn profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        use schema::profiles;

        Ok(profiles::table
            .find(id)
            .select(Profile::as_select())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?)
    }

    /// Returns the profile of the given user, if it has one.
    pub async fn profile_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        use schema::profiles;

        Ok(profiles::table
            .filter(profiles::user_id.eq(user_id))
            .select(Profile::as_select())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?)
    }

    /// Returns the users that `subscriber_id` is subscribed to.
    pub async fn subscribed_authors(&self, subscriber_id: Uuid) -> anyhow::Result<Vec<User>> {
        let mut conn = self.conn().await?;
        diesel_queries::subscribed_authors(&mut conn, subscriber_id).await
    }

    /// Returns the users subscribed to `author_id`.
    pub async fn subscribers(&self, author_id: Uuid) -> anyhow::Result<Vec<User>> {
        let mut conn = self.conn().await?;
        diesel_queries::subscribers(&mut conn, author_id).await
    }
}

/// Setters and write operations.
impl Store {
    pub async fn create_user(&self, input: &inputs::CreateUserInput) -> anyhow::Result<User> {
        use schema::users;

        let new_user = NewUser {
            id: Uuid::new_v4(),
            name: &input.name,
            balance: input.balance,
        };

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut self.conn().await?)
            .await?;

        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    pub async fn create_profile(
        &self,
        input: &inputs::CreateProfileInput,
    ) -> anyhow::Result<Profile> {
        use schema::profiles;

        let new_profile = NewProfile {
            id: Uuid::new_v4(),
            is_male: input.is_male,
            year_of_birth: input.year_of_birth,
            user_id: input.user_id,
            member_type_id: input.member_type_id,
        };

        let profile = diesel::insert_into(profiles::table)
            .values(&new_profile)
            .returning(Profile::as_returning())
            .get_result(&mut self.conn().await?)
            .await?;

        debug!(profile_id = %profile.id, user_id = %profile.user_id, "Created profile");
        Ok(profile)
    }

    pub async fn create_post(&self, input: &inputs::CreatePostInput) -> anyhow::Result<Post> {
        use schema::posts;

        let new_post = NewPost {
            id: Uuid::new_v4(),
            title: &input.title,
            content: &input.content,
            author_id: input.author_id,
        };

        let post = diesel::insert_into(posts::table)
            .values(&new_post)
            .returning(Post::as_returning())
            .get_result(&mut self.conn().await?)
            .await?;

        debug!(post_id = %post.id, author_id = %post.author_id, "Created post");
        Ok(post)
    }

    /// Applies the given changes to a user. Fails if the user doesn't exist.
    pub async fn update_user(&self, id: Uuid, changes: UserChangeset) -> anyhow::Result<User> {
        use schema::users;

        // Diesel refuses to build an `UPDATE` without any assignments.
        if changes.is_empty() {
            return self.user(id).await?.context(format!("no user with id {id}"));
        }

        diesel::update(users::table.find(id))
            .set(&changes)
            .returning(User::as_returning())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?
            .context(format!("no user with id {id}"))
    }

    /// Applies the given changes to a profile. Fails if the profile doesn't
    /// exist.
    pub async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChangeset,
    ) -> anyhow::Result<Profile> {
        use schema::profiles;

        if changes.is_empty() {
            return self
                .profile(id)
                .await?
                .context(format!("no profile with id {id}"));
        }

        diesel::update(profiles::table.find(id))
            .set(&changes)
            .returning(Profile::as_returning())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?
            .context(format!("no profile with id {id}"))
    }

    /// Applies the given changes to a post. Fails if the post doesn't exist.
    pub async fn update_post(&self, id: Uuid, changes: PostChangeset) -> anyhow::Result<Post> {
        use schema::posts;

        if changes.is_empty() {
            return self.post(id).await?.context(format!("no post with id {id}"));
        }

        diesel::update(posts::table.find(id))
            .set(&changes)
            .returning(Post::as_returning())
            .get_result(&mut self.conn().await?)
            .await
            .optional()?
            .context(format!("no post with id {id}"))
    }

    /// Deletes a user. Its profile, posts and subscriptions go with it through
    /// `ON DELETE CASCADE`.
    pub async fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
        use schema::users;

        let deleted = diesel::delete(users::table.find(id))
            .execute(&mut self.conn().await?)
            .await?;
        ensure!(deleted > 0, "no user with id {id}");

        Ok(())
    }

    pub async fn delete_profile(&self, id: Uuid) -> anyhow::Result<()> {
        use schema::profiles;

        let deleted = diesel::delete(profiles::table.find(id))
            .execute(&mut self.conn().await?)
            .await?;
        ensure!(deleted > 0, "no profile with id {id}");

        Ok(())
    }

    pub async fn delete_post(&self, id: Uuid) -> anyhow::Result<()> {
        use schema::posts;

        let deleted = diesel::delete(posts::table.find(id))
            .execute(&mut self.conn().await?)
            .await?;
        ensure!(deleted > 0, "no post with id {id}");

        Ok(())
    }

    /// Subscribes `subscriber_id` to the posts of `author_id`. Subscribing
    /// twice is an error.
    pub async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> anyhow::Result<()> {
        use schema::subscribers_on_authors as soa;

        diesel::insert_into(soa::table)
            .values(&NewSubscription {
                subscriber_id,
                author_id,
            })
            .execute(&mut self.conn().await?)
            .await?;

        Ok(())
    }

    pub async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> anyhow::Result<()> {
        use schema::subscribers_on_authors as soa;

        let deleted = diesel::delete(soa::table.find((subscriber_id, author_id)))
            .execute(&mut self.conn().await?)
            .await?;
        ensure!(
            deleted > 0,
            "user {subscriber_id} is not subscribed to {author_id}"
        );

        Ok(())
    }
}
