//! create nodes table migration

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_tailnets::Tailnets;
use super::m20260301_000002_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Nodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Nodes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Nodes::TailnetId).big_integer().not_null())
                    .col(ColumnDef::new(Nodes::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Nodes::MachineKey).var_binary(32).not_null())
                    .col(ColumnDef::new(Nodes::NodeKey).var_binary(32).not_null())
                    .col(ColumnDef::new(Nodes::DiscoKey).var_binary(32).not_null())
                    .col(ColumnDef::new(Nodes::Name).string().not_null())
                    .col(
                        ColumnDef::new(Nodes::NameIndex)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Nodes::Ipv4).string())
                    .col(ColumnDef::new(Nodes::Ipv6).string())
                    .col(ColumnDef::new(Nodes::Endpoints).text().not_null().default("[]"))
                    .col(ColumnDef::new(Nodes::Hostinfo).text())
                    .col(ColumnDef::new(Nodes::Tags).text().not_null().default("[]"))
                    .col(
                        ColumnDef::new(Nodes::ApprovedRoutes)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Nodes::AutoApprovedRoutes)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Nodes::Ephemeral)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Nodes::Authorized)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Nodes::AuthKeyId).big_integer())
                    .col(ColumnDef::new(Nodes::Expiry).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Nodes::KeyExpiryDisabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Nodes::LastSeen).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Nodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Nodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Nodes::DeletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_nodes_tailnet")
                            .from(Nodes::Table, Nodes::TailnetId)
                            .to(Tailnets::Table, Tailnets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_nodes_user")
                            .from(Nodes::Table, Nodes::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // peer listing is always per tailnet
        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_tailnet_id")
                    .table(Nodes::Table)
                    .col(Nodes::TailnetId)
                    .to_owned(),
            )
            .await?;

        // index on machine_key for registration lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_machine_key")
                    .table(Nodes::Table)
                    .col(Nodes::MachineKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_node_key")
                    .table(Nodes::Table)
                    .col(Nodes::NodeKey)
                    .to_owned(),
            )
            .await?;

        // index for soft deletes
        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_deleted_at")
                    .table(Nodes::Table)
                    .col(Nodes::DeletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Nodes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Nodes {
    Table,
    Id,
    TailnetId,
    UserId,
    MachineKey,
    NodeKey,
    DiscoKey,
    Name,
    NameIndex,
    Ipv4,
    Ipv6,
    Endpoints,
    Hostinfo,
    Tags,
    ApprovedRoutes,
    AutoApprovedRoutes,
    Ephemeral,
    Authorized,
    AuthKeyId,
    Expiry,
    KeyExpiryDisabled,
    LastSeen,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
