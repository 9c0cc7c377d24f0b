pub mod balances;
pub mod miners;
pub mod payouts;
pub mod prelude;
pub mod rounds;
pub mod shares;
pub mod stats;
