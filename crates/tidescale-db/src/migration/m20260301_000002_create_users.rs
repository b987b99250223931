//! create users table migration

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_tailnets::Tailnets;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::TailnetId).big_integer().not_null())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string())
                    .col(ColumnDef::new(Users::AccountId).string())
                    .col(
                        ColumnDef::new(Users::UserType)
                            .string()
                            .not_null()
                            .default("person"),
                    )
                    .col(ColumnDef::new(Users::ProfilePicUrl).string())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Users::DeletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_users_tailnet")
                            .from(Users::Table, Users::TailnetId)
                            .to(Tailnets::Table, Tailnets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // logins are looked up per tailnet
        manager
            .create_index(
                Index::create()
                    .name("idx_users_tailnet_name")
                    .table(Users::Table)
                    .col(Users::TailnetId)
                    .col(Users::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Users {
    Table,
    Id,
    TailnetId,
    Name,
    DisplayName,
    AccountId,
    UserType,
    ProfilePicUrl,
    CreatedAt,
    DeletedAt,
}
