//! create auth_keys table migration

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
                    .table(AuthKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthKeys::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuthKeys::Key).string().not_null().unique_key())
                    .col(ColumnDef::new(AuthKeys::SecretHash).var_binary(64).not_null())
                    .col(ColumnDef::new(AuthKeys::TailnetId).big_integer().not_null())
                    .col(ColumnDef::new(AuthKeys::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(AuthKeys::Ephemeral)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AuthKeys::PreAuthorized)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(AuthKeys::Tags).text().not_null().default("[]"))
                    .col(ColumnDef::new(AuthKeys::ExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(AuthKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuthKeys::DeletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_keys_tailnet")
                            .from(AuthKeys::Table, AuthKeys::TailnetId)
                            .to(Tailnets::Table, Tailnets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_keys_user")
                            .from(AuthKeys::Table, AuthKeys::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum AuthKeys {
    Table,
    Id,
    Key,
    SecretHash,
    TailnetId,
    UserId,
    Ephemeral,
    PreAuthorized,
    Tags,
    ExpiresAt,
    CreatedAt,
    DeletedAt,
}
