//! tailnet entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use tidescale_types::{DerpMap, DnsSettings, Tailnet, TailnetId};

use super::{json_or_default, to_json};

/// tailnet database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tailnets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,

    /// json-serialized dnssettings
    #[sea_orm(column_type = "Text")]
    pub dns: String,

    /// policy documents as written, comments included
    #[sea_orm(column_type = "Text")]
    pub acl_policy: String,
    #[sea_orm(column_type = "Text")]
    pub iam_policy: String,

    /// json-serialized derpmap override
    #[sea_orm(column_type = "Text", nullable)]
    pub derp_map: Option<String>,

    pub file_sharing: bool,
    pub service_collection: bool,
    pub ssh: bool,
    pub machine_authorization: bool,

    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
    #[sea_orm(has_many = "super::node::Entity")]
    Nodes,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Nodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Tailnet {
    fn from(model: Model) -> Self {
        let dns: DnsSettings = json_or_default(&model.dns, "tailnets", model.id, "dns");
        let derp_map: Option<DerpMap> =
            model
                .derp_map
                .as_deref()
                .and_then(|s| match serde_json::from_str(s) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(tailnet_id = model.id, error = %e, "failed to parse tailnet derp_map JSON");
                        None
                    }
                });

        Tailnet {
            id: TailnetId(model.id as u64),
            name: model.name,
            dns,
            acl_policy: model.acl_policy,
            iam_policy: model.iam_policy,
            derp_map,
            file_sharing: model.file_sharing,
            service_collection: model.service_collection,
            ssh: model.ssh,
            machine_authorization: model.machine_authorization,
            created_at: model.created_at,
        }
    }
}

impl From<&Tailnet> for ActiveModel {
    fn from(tailnet: &Tailnet) -> Self {
        ActiveModel {
            id: if tailnet.id.0 == 0 {
                NotSet
            } else {
                Set(tailnet.id.0 as i64)
            },
            name: Set(tailnet.name.clone()),
            dns: Set(to_json(&tailnet.dns, "{}")),
            acl_policy: Set(tailnet.acl_policy.clone()),
            iam_policy: Set(tailnet.iam_policy.clone()),
            derp_map: Set(tailnet.derp_map.as_ref().map(|m| to_json(m, "{}"))),
            file_sharing: Set(tailnet.file_sharing),
            service_collection: Set(tailnet.service_collection),
            ssh: Set(tailnet.ssh),
            machine_authorization: Set(tailnet.machine_authorization),
            created_at: Set(tailnet.created_at),
            deleted_at: NotSet,
        }
    }
}
