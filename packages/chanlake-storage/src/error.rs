#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
impl Error {
	/// Whether the database itself became unreachable, as opposed to one statement failing.
	pub fn is_connection(&self) -> bool {
		match self {
			Self::Sqlx(err) => is_connection_error(err),
			Self::SerdeJson(_) | Self::InvalidArgument(_) => false,
		}
	}
}

pub fn is_connection_error(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::Io(_)
		| sqlx::Error::Tls(_)
		| sqlx::Error::Protocol(_)
		| sqlx::Error::Configuration(_)
		| sqlx::Error::PoolTimedOut
		| sqlx::Error::PoolClosed
		| sqlx::Error::WorkerCrashed => true,
		// SQLSTATE class 08 is connection exception; 57P covers server shutdown.
		sqlx::Error::Database(db_err) => db_err
			.code()
			.map(|code| code.starts_with("08") || code.starts_with("57P"))
			.unwrap_or(false),
		_ => false,
	}
}
