//! user entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use tidescale_types::{TailnetId, User, UserId, UserType};

/// user database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tailnet_id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub account_id: Option<String>,
    /// "person" or "service"
    pub user_type: String,
    pub profile_pic_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tailnet::Entity",
        from = "Column::TailnetId",
        to = "super::tailnet::Column::Id"
    )]
    Tailnet,
    #[sea_orm(has_many = "super::node::Entity")]
    Nodes,
    #[sea_orm(has_many = "super::auth_key::Entity")]
    AuthKeys,
}

impl Related<super::tailnet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tailnet.def()
    }
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Nodes.def()
    }
}

impl Related<super::auth_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuthKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for User {
    fn from(model: Model) -> Self {
        let user_type = model.user_type.parse().unwrap_or_else(|e| {
            warn!(user_id = model.id, error = %e, "unknown user type, treating as person");
            UserType::Person
        });

        User {
            id: UserId(model.id as u64),
            tailnet_id: TailnetId(model.tailnet_id as u64),
            name: model.name,
            display_name: model.display_name,
            account_id: model.account_id,
            user_type,
            profile_pic_url: model.profile_pic_url,
            created_at: model.created_at,
        }
    }
}

impl From<&User> for ActiveModel {
    fn from(user: &User) -> Self {
        ActiveModel {
            id: if user.id.0 == 0 {
                NotSet
            } else {
                Set(user.id.0 as i64)
            },
            tailnet_id: Set(user.tailnet_id.0 as i64),
            name: Set(user.name.clone()),
            display_name: Set(user.display_name.clone()),
            account_id: Set(user.account_id.clone()),
            user_type: Set(user.user_type.as_str().to_string()),
            profile_pic_url: Set(user.profile_pic_url.clone()),
            created_at: Set(user.created_at),
            deleted_at: NotSet,
        }
    }
}
