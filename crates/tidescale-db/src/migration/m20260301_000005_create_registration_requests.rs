//! create registration_requests table migration

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
                    .table(RegistrationRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RegistrationRequests::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::MachineKey)
                            .var_binary(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::TailnetId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RegistrationRequests::Payload).text().not_null())
                    .col(
                        ColumnDef::new(RegistrationRequests::Authenticated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RegistrationRequests::Error).string())
                    .col(ColumnDef::new(RegistrationRequests::UserId).big_integer())
                    .col(
                        ColumnDef::new(RegistrationRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_requests_tailnet")
                            .from(RegistrationRequests::Table, RegistrationRequests::TailnetId)
                            .to(Tailnets::Table, Tailnets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_registration_requests_machine_key")
                    .table(RegistrationRequests::Table)
                    .col(RegistrationRequests::MachineKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegistrationRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RegistrationRequests {
    Table,
    Id,
    Code,
    MachineKey,
    TailnetId,
    Payload,
    Authenticated,
    Error,
    UserId,
    CreatedAt,
}
