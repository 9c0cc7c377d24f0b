pub use super::balances::Entity as Balances;
pub use super::miners::Entity as Miners;
pub use super::payouts::Entity as Payouts;
pub use super::rounds::Entity as Rounds;
pub use super::shares::Entity as Shares;
pub use super::stats::Entity as Stats;
