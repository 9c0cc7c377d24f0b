pub use sea_orm::error::DbErr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    DatabaseError(#[from] DbErr),
    #[error("row not found: {entity}")]
    NotFound { entity: &'static str },
    #[error("balance for {miner} would go negative (confirmed {confirmed}, debit {debit})")]
    InsufficientBalance {
        miner: String,
        confirmed: i64,
        debit: i64,
    },
}
