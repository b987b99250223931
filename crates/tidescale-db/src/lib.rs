//! database layer for tidescale.
//!
//! this crate provides persistent storage for:
//! - Tailnets
//! - Users
//! - Nodes
//! - AuthKeys
//! - RegistrationRequests
//!
//! it also handles address allocation for new nodes.

#![warn(missing_docs)]

mod entity;
mod error;
mod ip_allocator;
mod migration;

pub use error::Error;
pub use ip_allocator::{AddressAllocator, AllocationError, CGNAT_RANGE, embed_v6};
pub use sea_orm::DatabaseTransaction;

use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, Database as SeaOrmDatabase,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionError, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use tidescale_types::{
    AuthKey, AuthKeyId, Config, DatabaseConfig, MachineKey, Node, NodeId, NodeKey,
    RegistrationId, RegistrationRequest, Tailnet, TailnetId, User, UserId, UserType,
};

/// result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// boxed future handed to [`Repository::transaction`] callbacks.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// storage operations the control server consumes.
///
/// all lookups skip soft-deleted rows. deletes of tailnets, users, nodes and
/// auth keys set `deleted_at`; purged nodes and registration requests are
/// removed outright.
pub trait Repository: Send + Sync {
    // ─── Health Check ─────────────────────────────────────────────────────────

    /// ping the database to verify connectivity.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// run `f` inside a transaction. an `Err` from `f` rolls back.
    fn transaction<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T> + Send;

    // ─── Tailnet Operations ──────────────────────────────────────────────────

    /// create a tailnet together with its service user.
    fn create_tailnet(&self, tailnet: &Tailnet) -> impl Future<Output = Result<Tailnet>> + Send;

    /// get a tailnet by id.
    fn get_tailnet(&self, id: TailnetId) -> impl Future<Output = Result<Option<Tailnet>>> + Send;

    /// get a tailnet by its unique name.
    fn get_tailnet_by_name(&self, name: &str)
    -> impl Future<Output = Result<Option<Tailnet>>> + Send;

    /// list all live tailnets.
    fn list_tailnets(&self) -> impl Future<Output = Result<Vec<Tailnet>>> + Send;

    /// update a tailnet's settings and policies.
    fn update_tailnet(&self, tailnet: &Tailnet) -> impl Future<Output = Result<Tailnet>> + Send;

    /// soft-delete a tailnet.
    fn delete_tailnet(&self, id: TailnetId) -> impl Future<Output = Result<()>> + Send;

    // ─── User Operations ─────────────────────────────────────────────────────

    /// create a user. returns it with its assigned id.
    fn create_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// get a user by id.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// get a user by login name within a tailnet.
    fn get_user_by_name(
        &self,
        tailnet: TailnetId,
        name: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// the tailnet's service user.
    fn get_service_user(
        &self,
        tailnet: TailnetId,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// list a tailnet's users.
    fn list_users(&self, tailnet: TailnetId) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// update a user.
    fn update_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// soft-delete a user with their nodes and auth keys, atomically.
    fn delete_user(&self, id: UserId) -> impl Future<Output = Result<()>> + Send;

    // ─── Node Operations ─────────────────────────────────────────────────────

    /// create a node. fails with [`Error::AlreadyExists`] when a live node
    /// holds either address.
    fn create_node(&self, node: &Node) -> impl Future<Output = Result<Node>> + Send;

    /// get a node by id.
    fn get_node(&self, id: NodeId) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// get a node by its machine key.
    fn get_node_by_machine_key(
        &self,
        key: &MachineKey,
    ) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// get a node by its current node key.
    fn get_node_by_node_key(
        &self,
        key: &NodeKey,
    ) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// list a tailnet's nodes.
    fn list_nodes(&self, tailnet: TailnetId) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// list a tailnet's nodes except `exclude`, ordered by id.
    fn list_peers(
        &self,
        tailnet: TailnetId,
        exclude: NodeId,
    ) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// update a node. `updated_at` is set to now.
    fn update_node(&self, node: &Node) -> impl Future<Output = Result<Node>> + Send;

    /// soft-delete a node. its addresses become reusable.
    fn delete_node(&self, id: NodeId) -> impl Future<Output = Result<()>> + Send;

    /// remove a node's row outright. used for ephemeral nodes, which leave
    /// nothing behind.
    fn purge_node(&self, id: NodeId) -> impl Future<Output = Result<()>> + Send;

    /// ephemeral nodes last seen before `before`. nodes that were never seen
    /// count from their creation.
    fn list_inactive_ephemeral(
        &self,
        before: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// number of live nodes holding `addr`.
    fn count_by_address(&self, addr: Ipv4Addr) -> impl Future<Output = Result<u64>> + Send;

    /// the name index a new node called `name` should take: 0 when the name
    /// is free, one past the highest index in use otherwise.
    fn next_name_index(
        &self,
        tailnet: TailnetId,
        name: &str,
    ) -> impl Future<Output = Result<u32>> + Send;

    /// record when a node was last connected.
    fn set_last_seen(&self, id: NodeId, at: DateTime<Utc>)
    -> impl Future<Output = Result<()>> + Send;

    // ─── AuthKey Operations ──────────────────────────────────────────────────

    /// create an auth key.
    fn create_auth_key(&self, key: &AuthKey) -> impl Future<Output = Result<AuthKey>> + Send;

    /// look up an auth key by the public part of its token.
    fn get_auth_key(&self, key: &str) -> impl Future<Output = Result<Option<AuthKey>>> + Send;

    /// list a tailnet's auth keys.
    fn list_auth_keys(&self, tailnet: TailnetId)
    -> impl Future<Output = Result<Vec<AuthKey>>> + Send;

    /// soft-delete an auth key.
    fn delete_auth_key(&self, id: AuthKeyId) -> impl Future<Output = Result<()>> + Send;

    // ─── Registration Operations ─────────────────────────────────────────────

    /// persist a pending registration.
    fn create_registration(
        &self,
        request: &RegistrationRequest,
    ) -> impl Future<Output = Result<RegistrationRequest>> + Send;

    /// get a registration by its code.
    fn get_registration(
        &self,
        code: &RegistrationId,
    ) -> impl Future<Output = Result<Option<RegistrationRequest>>> + Send;

    /// the newest registration for a machine.
    fn get_registration_by_machine_key(
        &self,
        key: &MachineKey,
    ) -> impl Future<Output = Result<Option<RegistrationRequest>>> + Send;

    /// store the outcome of a registration (authenticated, error, user).
    fn update_registration(
        &self,
        request: &RegistrationRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    /// remove a registration.
    fn delete_registration(&self, code: &RegistrationId)
    -> impl Future<Output = Result<()>> + Send;

    /// remove registrations created before `before`. returns how many.
    fn delete_registrations_before(
        &self,
        before: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// the main database implementation using sea-orm.
#[derive(Clone)]
pub struct TidescaleDb {
    conn: DatabaseConnection,
}

impl TidescaleDb {
    /// create a new database connection from config and migrate it.
    pub async fn new(config: &Config) -> Result<Self> {
        let url = Self::build_connection_url(&config.database)?;
        let conn: DatabaseConnection = SeaOrmDatabase::connect(&url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        tracing::info!(db_type = %config.database.db_type, "database ready");
        Ok(db)
    }

    /// build a sea-orm compatible connection url from config.
    fn build_connection_url(config: &DatabaseConfig) -> Result<String> {
        match config.db_type.as_str() {
            "sqlite" => {
                let path = if config.connection_string.starts_with("sqlite:") {
                    config.connection_string.clone()
                } else {
                    format!("sqlite:{}", config.connection_string)
                };
                // add ?mode=rwc to create file if it doesn't exist
                if path.contains('?') {
                    Ok(path)
                } else {
                    Ok(format!("{}?mode=rwc", path))
                }
            }
            "postgres" | "postgresql" => Ok(config.connection_string.clone()),
            other => Err(Error::InvalidData(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }

    /// create an in-memory sqlite database for testing.
    pub async fn new_in_memory() -> Result<Self> {
        let conn: DatabaseConnection = SeaOrmDatabase::connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// rows in the node table, soft-deleted ones included.
    pub async fn count_node_rows(&self) -> Result<u64> {
        Ok(entity::node::Entity::find().count(&self.conn).await?)
    }

    /// run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        migration::Migrator::up(&self.conn, None)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }
}

/// set `deleted_at` on every live row matching `filter`.
async fn soft_delete<E, C>(conn: &C, filter: Condition, deleted_at: E::Column) -> Result<u64>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let result = E::update_many()
        .col_expr(deleted_at, Expr::value(Utc::now()))
        .filter(filter)
        .filter(deleted_at.is_null())
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

impl Repository for TidescaleDb {
    // health check

    async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(())
    }

    async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T> + Send,
    {
        self.conn.transaction(f).await.map_err(|e| match e {
            TransactionError::Connection(e) => e.into(),
            TransactionError::Transaction(e) => e,
        })
    }

    // tailnet operations

    async fn create_tailnet(&self, tailnet: &Tailnet) -> Result<Tailnet> {
        let model: entity::tailnet::ActiveModel = tailnet.into();
        self.transaction(|txn| {
            Box::pin(async move {
                let created: Tailnet = model.insert(txn).await?.into();
                let service = User::service(UserId(0), created.id);
                entity::user::ActiveModel::from(&service).insert(txn).await?;
                Ok(created)
            })
        })
        .await
    }

    async fn get_tailnet(&self, id: TailnetId) -> Result<Option<Tailnet>> {
        let result = entity::tailnet::Entity::find_by_id(id.0 as i64)
            .filter(entity::tailnet::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_tailnet_by_name(&self, name: &str) -> Result<Option<Tailnet>> {
        let result = entity::tailnet::Entity::find()
            .filter(entity::tailnet::Column::Name.eq(name))
            .filter(entity::tailnet::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_tailnets(&self) -> Result<Vec<Tailnet>> {
        let results = entity::tailnet::Entity::find()
            .filter(entity::tailnet::Column::DeletedAt.is_null())
            .order_by_asc(entity::tailnet::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn update_tailnet(&self, tailnet: &Tailnet) -> Result<Tailnet> {
        let model: entity::tailnet::ActiveModel = tailnet.into();
        let result = model.update(&self.conn).await?;
        Ok(result.into())
    }

    async fn delete_tailnet(&self, id: TailnetId) -> Result<()> {
        soft_delete::<entity::tailnet::Entity, _>(
            &self.conn,
            Condition::all().add(entity::tailnet::Column::Id.eq(id.0 as i64)),
            entity::tailnet::Column::DeletedAt,
        )
        .await?;
        Ok(())
    }

    // user operations

    async fn create_user(&self, user: &User) -> Result<User> {
        let model: entity::user::ActiveModel = user.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let result = entity::user::Entity::find_by_id(id.0 as i64)
            .filter(entity::user::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_user_by_name(&self, tailnet: TailnetId, name: &str) -> Result<Option<User>> {
        let result = entity::user::Entity::find()
            .filter(entity::user::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::user::Column::Name.eq(name))
            .filter(entity::user::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_service_user(&self, tailnet: TailnetId) -> Result<Option<User>> {
        let result = entity::user::Entity::find()
            .filter(entity::user::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::user::Column::UserType.eq(UserType::Service.as_str()))
            .filter(entity::user::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_users(&self, tailnet: TailnetId) -> Result<Vec<User>> {
        let results = entity::user::Entity::find()
            .filter(entity::user::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::user::Column::DeletedAt.is_null())
            .order_by_asc(entity::user::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let model: entity::user::ActiveModel = user.into();
        let result = model.update(&self.conn).await?;
        Ok(result.into())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let user_id = id.0 as i64;
        self.transaction(|txn| {
            Box::pin(async move {
                let nodes = soft_delete::<entity::node::Entity, _>(
                    txn,
                    Condition::all().add(entity::node::Column::UserId.eq(user_id)),
                    entity::node::Column::DeletedAt,
                )
                .await?;
                let keys = soft_delete::<entity::auth_key::Entity, _>(
                    txn,
                    Condition::all().add(entity::auth_key::Column::UserId.eq(user_id)),
                    entity::auth_key::Column::DeletedAt,
                )
                .await?;
                soft_delete::<entity::user::Entity, _>(
                    txn,
                    Condition::all().add(entity::user::Column::Id.eq(user_id)),
                    entity::user::Column::DeletedAt,
                )
                .await?;
                tracing::debug!(user_id, nodes, keys, "user deleted");
                Ok(())
            })
        })
        .await
    }

    // node operations

    async fn create_node(&self, node: &Node) -> Result<Node> {
        let model: entity::node::ActiveModel = node.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let result = entity::node::Entity::find_by_id(id.0 as i64)
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_node_by_machine_key(&self, key: &MachineKey) -> Result<Option<Node>> {
        let result = entity::node::Entity::find()
            .filter(entity::node::Column::MachineKey.eq(key.as_bytes().to_vec()))
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_node_by_node_key(&self, key: &NodeKey) -> Result<Option<Node>> {
        let result = entity::node::Entity::find()
            .filter(entity::node::Column::NodeKey.eq(key.as_bytes().to_vec()))
            .filter(entity::node::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_nodes(&self, tailnet: TailnetId) -> Result<Vec<Node>> {
        let results = entity::node::Entity::find()
            .filter(entity::node::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::node::Column::DeletedAt.is_null())
            .order_by_asc(entity::node::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn list_peers(&self, tailnet: TailnetId, exclude: NodeId) -> Result<Vec<Node>> {
        let results = entity::node::Entity::find()
            .filter(entity::node::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::node::Column::Id.ne(exclude.0 as i64))
            .filter(entity::node::Column::DeletedAt.is_null())
            .order_by_asc(entity::node::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        let mut model: entity::node::ActiveModel = node.into();
        model.updated_at = Set(Utc::now());
        let result = model.update(&self.conn).await?;
        Ok(result.into())
    }

    async fn delete_node(&self, id: NodeId) -> Result<()> {
        soft_delete::<entity::node::Entity, _>(
            &self.conn,
            Condition::all().add(entity::node::Column::Id.eq(id.0 as i64)),
            entity::node::Column::DeletedAt,
        )
        .await?;
        Ok(())
    }

    async fn purge_node(&self, id: NodeId) -> Result<()> {
        let result = entity::node::Entity::delete_by_id(id.0 as i64)
            .exec(&self.conn)
            .await?;
        tracing::debug!(node_id = id.0, rows = result.rows_affected, "node purged");
        Ok(())
    }

    async fn list_inactive_ephemeral(&self, before: DateTime<Utc>) -> Result<Vec<Node>> {
        use entity::node::Column;

        let inactive = Condition::any()
            .add(Column::LastSeen.lt(before))
            .add(
                Condition::all()
                    .add(Column::LastSeen.is_null())
                    .add(Column::CreatedAt.lt(before)),
            );
        let results = entity::node::Entity::find()
            .filter(Column::Ephemeral.eq(true))
            .filter(Column::DeletedAt.is_null())
            .filter(inactive)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn count_by_address(&self, addr: Ipv4Addr) -> Result<u64> {
        let count = entity::node::Entity::find()
            .filter(entity::node::Column::Ipv4.eq(addr.to_string()))
            .filter(entity::node::Column::DeletedAt.is_null())
            .count(&self.conn)
            .await?;
        Ok(count)
    }

    async fn next_name_index(&self, tailnet: TailnetId, name: &str) -> Result<u32> {
        let indexes: Vec<i32> = entity::node::Entity::find()
            .select_only()
            .column(entity::node::Column::NameIndex)
            .filter(entity::node::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::node::Column::Name.eq(name))
            .filter(entity::node::Column::DeletedAt.is_null())
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(indexes
            .into_iter()
            .max()
            .map_or(0, |max| max.max(0) as u32 + 1))
    }

    async fn set_last_seen(&self, id: NodeId, at: DateTime<Utc>) -> Result<()> {
        entity::node::Entity::update_many()
            .col_expr(entity::node::Column::LastSeen, Expr::value(at))
            .filter(entity::node::Column::Id.eq(id.0 as i64))
            .filter(entity::node::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    // auth key operations

    async fn create_auth_key(&self, key: &AuthKey) -> Result<AuthKey> {
        let model: entity::auth_key::ActiveModel = key.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_auth_key(&self, key: &str) -> Result<Option<AuthKey>> {
        let result = entity::auth_key::Entity::find()
            .filter(entity::auth_key::Column::Key.eq(key))
            .filter(entity::auth_key::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_auth_keys(&self, tailnet: TailnetId) -> Result<Vec<AuthKey>> {
        let results = entity::auth_key::Entity::find()
            .filter(entity::auth_key::Column::TailnetId.eq(tailnet.0 as i64))
            .filter(entity::auth_key::Column::DeletedAt.is_null())
            .order_by_asc(entity::auth_key::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn delete_auth_key(&self, id: AuthKeyId) -> Result<()> {
        soft_delete::<entity::auth_key::Entity, _>(
            &self.conn,
            Condition::all().add(entity::auth_key::Column::Id.eq(id.0 as i64)),
            entity::auth_key::Column::DeletedAt,
        )
        .await?;
        Ok(())
    }

    // registration operations

    async fn create_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationRequest> {
        let model: entity::registration_request::ActiveModel = request.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_registration(&self, code: &RegistrationId) -> Result<Option<RegistrationRequest>> {
        let result = entity::registration_request::Entity::find()
            .filter(entity::registration_request::Column::Code.eq(code.as_str()))
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn get_registration_by_machine_key(
        &self,
        key: &MachineKey,
    ) -> Result<Option<RegistrationRequest>> {
        let result = entity::registration_request::Entity::find()
            .filter(entity::registration_request::Column::MachineKey.eq(key.as_bytes().to_vec()))
            .order_by_desc(entity::registration_request::Column::CreatedAt)
            .order_by_desc(entity::registration_request::Column::Id)
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn update_registration(&self, request: &RegistrationRequest) -> Result<()> {
        use entity::registration_request::Column;

        let result = entity::registration_request::Entity::update_many()
            .col_expr(Column::Authenticated, Expr::value(request.authenticated))
            .col_expr(Column::Error, Expr::value(request.error.clone()))
            .col_expr(
                Column::UserId,
                Expr::value(request.user_id.map(|id| id.0 as i64)),
            )
            .filter(Column::Code.eq(request.code.as_str()))
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound(format!(
                "registration request {}",
                request.code
            )));
        }
        Ok(())
    }

    async fn delete_registration(&self, code: &RegistrationId) -> Result<()> {
        entity::registration_request::Entity::delete_many()
            .filter(entity::registration_request::Column::Code.eq(code.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn delete_registrations_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = entity::registration_request::Entity::delete_many()
            .filter(entity::registration_request::Column::CreatedAt.lt(before))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
