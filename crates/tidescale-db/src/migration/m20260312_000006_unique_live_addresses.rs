//! unique addresses among live nodes.
//!
//! the allocator takes no locks; these indexes are what stops two
//! registrations from claiming the same address. soft-deleted rows are
//! excluded so their addresses can be reused. partial indexes are not
//! expressible through the schema builder, the sql is the same on sqlite
//! and postgres.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_ipv4_live ON nodes (ipv4) WHERE deleted_at IS NULL",
        )
        .await?;
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_ipv6_live ON nodes (ipv6) WHERE deleted_at IS NULL",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP INDEX IF EXISTS idx_nodes_ipv4_live")
            .await?;
        db.execute_unprepared("DROP INDEX IF EXISTS idx_nodes_ipv6_live")
            .await?;
        Ok(())
    }
}
