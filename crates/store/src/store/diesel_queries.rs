//! Provides the diesel queries that span the subscription relation, callers
//! should handle connection pooling.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::models::User;
use crate::schema::{subscribers_on_authors as soa, users};

/// Users that `subscriber_id` is subscribed to.
pub(super) async fn subscribed_authors(
    conn: &mut AsyncPgConnection,
    subscriber_id: Uuid,
) -> anyhow::Result<Vec<User>> {
    let authors = soa::table
        .select(soa::author_id)
        .filter(soa::subscriber_id.eq(subscriber_id));

    Ok(users::table
        .filter(users::id.eq_any(authors))
        .select(User::as_select())
        .load(conn)
        .await?)
}

/// Users that are subscribed to `author_id`.
pub(super) async fn subscribers(
    conn: &mut AsyncPgConnection,
    author_id: Uuid,
) -> anyhow::Result<Vec<User>> {
    let subscribers = soa::table
        .select(soa::subscriber_id)
        .filter(soa::author_id.eq(author_id));

    Ok(users::table
        .filter(users::id.eq_any(subscribers))
        .select(User::as_select())
        .load(conn)
        .await?)
}
