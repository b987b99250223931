//! node entity for database storage.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use tidescale_types::{
    DiscoKey, HostInfo, MachineKey, Node, NodeId, NodeKey, Tag, TailnetId, UserId,
};

use super::{json_or_default, key_bytes, to_json};

/// node database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tailnet_id: i64,
    pub user_id: i64,

    /// machine key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub machine_key: Vec<u8>,

    /// node key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub node_key: Vec<u8>,

    /// disco key bytes
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub disco_key: Vec<u8>,

    pub name: String,
    pub name_index: i32,

    /// addresses as strings. unique among live nodes.
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,

    /// json-serialized vec<socketaddr>
    #[sea_orm(column_type = "Text")]
    pub endpoints: String,

    /// json-serialized hostinfo
    #[sea_orm(column_type = "Text", nullable)]
    pub hostinfo: Option<String>,

    /// json-serialized vec<string>
    #[sea_orm(column_type = "Text")]
    pub tags: String,

    /// json-serialized vec<ipnet>
    #[sea_orm(column_type = "Text")]
    pub approved_routes: String,

    /// json-serialized vec<ipnet>
    #[sea_orm(column_type = "Text")]
    pub auto_approved_routes: String,

    pub ephemeral: bool,
    pub authorized: bool,
    pub auth_key_id: Option<i64>,

    pub expiry: Option<DateTime<Utc>>,
    pub key_expiry_disabled: bool,
    pub last_seen: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
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
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::tailnet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tailnet.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Node {
    fn from(model: Model) -> Self {
        let id = model.id;
        let endpoints: Vec<SocketAddr> = json_or_default(&model.endpoints, "nodes", id, "endpoints");
        let hostinfo: Option<HostInfo> =
            model
                .hostinfo
                .as_ref()
                .and_then(|s| match serde_json::from_str(s) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(node_id = id, error = %e, "failed to parse node hostinfo JSON");
                        None
                    }
                });
        // invalid tags from hand-edited rows are dropped
        let tags: Vec<Tag> = json_or_default::<Vec<String>>(&model.tags, "nodes", id, "tags")
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let approved_routes: Vec<IpNet> =
            json_or_default(&model.approved_routes, "nodes", id, "approved_routes");
        let auto_approved_routes: Vec<IpNet> =
            json_or_default(&model.auto_approved_routes, "nodes", id, "auto_approved_routes");

        let ipv4: Option<Ipv4Addr> = model.ipv4.as_ref().and_then(|s| s.parse().ok());
        let ipv6: Option<Ipv6Addr> = model.ipv6.as_ref().and_then(|s| s.parse().ok());

        let mut builder = Node::builder(
            TailnetId(model.tailnet_id as u64),
            UserId(model.user_id as u64),
            MachineKey::from_bytes(key_bytes(&model.machine_key, "nodes", id)),
            NodeKey::from_bytes(key_bytes(&model.node_key, "nodes", id)),
            model.name,
        )
        .id(NodeId(id as u64))
        .name_index(model.name_index.max(0) as u32)
        .disco_key(DiscoKey::from_bytes(key_bytes(&model.disco_key, "nodes", id)))
        .endpoints(endpoints)
        .tags(tags)
        .approved_routes(approved_routes)
        .auto_approved_routes(auto_approved_routes)
        .ephemeral(model.ephemeral)
        .authorized(model.authorized)
        .key_expiry_disabled(model.key_expiry_disabled)
        .created_at(model.created_at)
        .updated_at(model.updated_at);

        if let Some(hi) = hostinfo {
            builder = builder.hostinfo(hi);
        }
        if let (Some(v4), Some(v6)) = (ipv4, ipv6) {
            builder = builder.addresses(v4, v6);
        }
        if let Some(key_id) = model.auth_key_id {
            builder = builder.auth_key_id(key_id as u64);
        }
        if let Some(exp) = model.expiry {
            builder = builder.expiry(exp);
        }
        if let Some(ls) = model.last_seen {
            builder = builder.last_seen(ls);
        }

        builder.build()
    }
}

impl From<&Node> for ActiveModel {
    fn from(node: &Node) -> Self {
        let tags: Vec<&str> = node.tags().iter().map(Tag::as_str).collect();

        ActiveModel {
            id: if node.id().as_u64() == 0 {
                NotSet
            } else {
                Set(node.id().as_u64() as i64)
            },
            tailnet_id: Set(node.tailnet_id().0 as i64),
            user_id: Set(node.user_id().0 as i64),
            machine_key: Set(node.machine_key().as_bytes().to_vec()),
            node_key: Set(node.node_key().as_bytes().to_vec()),
            disco_key: Set(node.disco_key().as_bytes().to_vec()),
            name: Set(node.name().to_string()),
            name_index: Set(node.name_index() as i32),
            ipv4: Set(node.ipv4().map(|ip| ip.to_string())),
            ipv6: Set(node.ipv6().map(|ip| ip.to_string())),
            endpoints: Set(to_json(&node.endpoints(), "[]")),
            hostinfo: Set(node.hostinfo().and_then(|h| serde_json::to_string(h).ok())),
            tags: Set(to_json(&tags, "[]")),
            approved_routes: Set(to_json(&node.approved_routes(), "[]")),
            auto_approved_routes: Set(to_json(&node.auto_approved_routes(), "[]")),
            ephemeral: Set(node.ephemeral()),
            authorized: Set(node.authorized()),
            auth_key_id: Set(node.auth_key_id().map(|id| id as i64)),
            expiry: Set(node.expiry()),
            key_expiry_disabled: Set(node.key_expiry_disabled()),
            last_seen: Set(node.last_seen()),
            created_at: Set(node.created_at()),
            updated_at: Set(node.updated_at()),
            deleted_at: NotSet,
        }
    }
}
