//! pending interactive registrations.
//!
//! rows are removed once resolved, so there is no soft-delete column.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use tidescale_types::{MachineKey, RegistrationId, RegistrationRequest, TailnetId, UserId};

use super::key_bytes;

/// registration request database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "registration_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub machine_key: Vec<u8>,
    pub tailnet_id: i64,
    /// the client's register request, json
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub authenticated: bool,
    pub error: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for RegistrationRequest {
    fn from(model: Model) -> Self {
        let payload = serde_json::from_str(&model.payload).unwrap_or_else(|e| {
            warn!(request_id = model.id, error = %e, "failed to parse registration payload JSON");
            serde_json::Value::Null
        });

        RegistrationRequest {
            machine_key: MachineKey::from_bytes(key_bytes(
                &model.machine_key,
                "registration_requests",
                model.id,
            )),
            code: RegistrationId::from(model.code),
            tailnet_id: TailnetId(model.tailnet_id as u64),
            payload,
            authenticated: model.authenticated,
            error: model.error,
            user_id: model.user_id.map(|id| UserId(id as u64)),
            created_at: model.created_at,
        }
    }
}

impl From<&RegistrationRequest> for ActiveModel {
    fn from(req: &RegistrationRequest) -> Self {
        ActiveModel {
            id: NotSet,
            code: Set(req.code.as_str().to_string()),
            machine_key: Set(req.machine_key.as_bytes().to_vec()),
            tailnet_id: Set(req.tailnet_id.0 as i64),
            payload: Set(req.payload.to_string()),
            authenticated: Set(req.authenticated),
            error: Set(req.error.clone()),
            user_id: Set(req.user_id.map(|id| id.0 as i64)),
            created_at: Set(req.created_at),
        }
    }
}
