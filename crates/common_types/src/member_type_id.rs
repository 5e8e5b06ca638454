use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::ToSql;
use diesel::sql_types;
use serde::{Deserialize, Serialize};

/// The membership tier a profile belongs to. Stored in the database as its
/// upper-case name, which is also the primary key of `member_types`.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsExpression,
    FromSqlRow,
    Serialize,
    Deserialize,
    async_graphql::Enum,
    // strum is used for (de)serialization in the database.
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[diesel(sql_type = sql_types::Text)]
#[graphql(name = "MemberTypeId")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberTypeId {
    Basic,
    Business,
}

impl ToSql<sql_types::Text, Pg> for MemberTypeId {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        let s: &'static str = self.into();
        <str as ToSql<sql_types::Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<sql_types::Text, Pg> for MemberTypeId {
    fn from_sql(bytes: PgValue<'_>) -> diesel::deserialize::Result<Self> {
        let s = <String as FromSql<sql_types::Text, Pg>>::from_sql(bytes)?;
        s.parse()
            .map_err(|_| anyhow::anyhow!("invalid member type id: {s}").into())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn database_representation_is_upper_case() {
        assert_eq!(MemberTypeId::Basic.to_string(), "BASIC");
        assert_eq!(MemberTypeId::Business.to_string(), "BUSINESS");
        assert_eq!(
            MemberTypeId::from_str("BUSINESS").unwrap(),
            MemberTypeId::Business
        );
        assert!(MemberTypeId::from_str("business").is_err());
    }

    #[test]
    fn serde_matches_graphql_names() {
        let json = serde_json::to_value(MemberTypeId::Basic).unwrap();
        assert_eq!(json, serde_json::json!("BASIC"));
    }
}
