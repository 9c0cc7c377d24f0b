pub use sea_orm_migration::prelude::*;

mod m20260412_091503_create_miners_table;
mod m20260412_092011_create_rounds_table;
mod m20260412_092547_create_shares_table;
mod m20260412_093208_create_balances_table;
mod m20260412_093722_create_payouts_table;
mod m20260412_094310_create_stats_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260412_091503_create_miners_table::Migration),
            Box::new(m20260412_092011_create_rounds_table::Migration),
            Box::new(m20260412_092547_create_shares_table::Migration),
            Box::new(m20260412_093208_create_balances_table::Migration),
            Box::new(m20260412_093722_create_payouts_table::Migration),
            Box::new(m20260412_094310_create_stats_table::Migration),
        ]
    }
}
