//! auth key entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};

use tidescale_types::{AuthKey, AuthKeyId, Tag, TailnetId, UserId};

use super::{json_or_default, to_json};

/// auth key database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// public lookup part of the token
    #[sea_orm(unique)]
    pub key: String,
    /// sha-256 of the secret part
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub secret_hash: Vec<u8>,
    pub tailnet_id: i64,
    pub user_id: i64,
    pub ephemeral: bool,
    pub pre_authorized: bool,
    /// json-serialized vec<string>
    #[sea_orm(column_type = "Text")]
    pub tags: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for AuthKey {
    fn from(model: Model) -> Self {
        // invalid tags from hand-edited rows are dropped
        let tags: Vec<Tag> =
            json_or_default::<Vec<String>>(&model.tags, "auth_keys", model.id, "tags")
                .into_iter()
                .filter_map(|s| s.parse().ok())
                .collect();

        AuthKey {
            id: AuthKeyId(model.id as u64),
            key: model.key,
            secret_hash: model.secret_hash,
            tailnet_id: TailnetId(model.tailnet_id as u64),
            user_id: UserId(model.user_id as u64),
            ephemeral: model.ephemeral,
            pre_authorized: model.pre_authorized,
            tags,
            expires_at: model.expires_at,
            created_at: model.created_at,
        }
    }
}

impl From<&AuthKey> for ActiveModel {
    fn from(key: &AuthKey) -> Self {
        let tags: Vec<&str> = key.tags.iter().map(Tag::as_str).collect();
        ActiveModel {
            id: if key.id.0 == 0 {
                NotSet
            } else {
                Set(key.id.0 as i64)
            },
            key: Set(key.key.clone()),
            secret_hash: Set(key.secret_hash.clone()),
            tailnet_id: Set(key.tailnet_id.0 as i64),
            user_id: Set(key.user_id.0 as i64),
            ephemeral: Set(key.ephemeral),
            pre_authorized: Set(key.pre_authorized),
            tags: Set(to_json(&tags, "[]")),
            expires_at: Set(key.expires_at),
            created_at: Set(key.created_at),
            deleted_at: NotSet,
        }
    }
}
