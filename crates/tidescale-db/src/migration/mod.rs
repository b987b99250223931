//! database migrations for tidescale.

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_tailnets;
mod m20260301_000002_create_users;
mod m20260301_000003_create_auth_keys;
mod m20260301_000004_create_nodes;
mod m20260301_000005_create_registration_requests;
mod m20260312_000006_unique_live_addresses;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_tailnets::Migration),
            Box::new(m20260301_000002_create_users::Migration),
            Box::new(m20260301_000003_create_auth_keys::Migration),
            Box::new(m20260301_000004_create_nodes::Migration),
            Box::new(m20260301_000005_create_registration_requests::Migration),
            Box::new(m20260312_000006_unique_live_addresses::Migration),
        ]
    }
}
