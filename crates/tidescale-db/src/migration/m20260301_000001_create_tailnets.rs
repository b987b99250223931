//! create tailnets table migration

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tailnets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tailnets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tailnets::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Tailnets::Dns).text().not_null().default("{}"))
                    .col(ColumnDef::new(Tailnets::AclPolicy).text().not_null().default(""))
                    .col(ColumnDef::new(Tailnets::IamPolicy).text().not_null().default(""))
                    .col(ColumnDef::new(Tailnets::DerpMap).text())
                    .col(
                        ColumnDef::new(Tailnets::FileSharing)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Tailnets::ServiceCollection)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tailnets::Ssh).boolean().not_null().default(true))
                    .col(
                        ColumnDef::new(Tailnets::MachineAuthorization)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tailnets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tailnets::DeletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tailnets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Tailnets {
    Table,
    Id,
    Name,
    Dns,
    AclPolicy,
    IamPolicy,
    DerpMap,
    FileSharing,
    ServiceCollection,
    Ssh,
    MachineAuthorization,
    CreatedAt,
    DeletedAt,
}
