use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Balance precheck or atomic debit guard rejected a buy.
    #[error("insufficient balance")]
    InsufficientFunds,

    /// Position precheck or atomic debit guard rejected a sell.
    #[error("insufficient position")]
    InsufficientPosition,

    /// Price falls outside the per-code sanity band or the ±10% market band.
    #[error("price {price} for {code} is outside the allowed range")]
    PriceOutOfBand { code: String, price: Decimal },

    /// Client-supplied price disagrees with the server-sourced market price.
    #[error("price mismatch: client sent {client} but market is {server}")]
    PriceMismatch { client: Decimal, server: Decimal },

    /// Idempotency key or order content hash seen within its window.
    #[error("duplicate order")]
    DuplicateOrder,

    /// Per-user order mutex could not be acquired within the wait budget.
    #[error("too many concurrent requests, retry shortly")]
    ContentionTimeout,

    /// Order placed outside the competition's trading window.
    #[error("competition is not open for trading: {0}")]
    CompetitionClosed(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// An atomic guard fired after the precheck passed: another request won
    /// the row in between. Safe to retry.
    #[error("concurrent request detected")]
    ConcurrentRequest,

    /// Malformed or unsatisfiable request (missing limit price, cancelling a
    /// non-pending order, key quota exceeded, ...).
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// HTTP status the embedding API layer maps this error to.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InsufficientFunds
            | Self::InsufficientPosition
            | Self::PriceOutOfBand { .. }
            | Self::PriceMismatch { .. }
            | Self::CompetitionClosed(_)
            | Self::ConcurrentRequest
            | Self::Invalid(_) => 400,
            Self::NotFound(_) => 404,
            Self::DuplicateOrder => 409,
            Self::ContentionTimeout => 429,
            _ => 500,
        }
    }

    /// True for failures a caller may blindly retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ContentionTimeout | Self::ConcurrentRequest)
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("row"),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for Error {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_api_contract() {
        assert_eq!(Error::InsufficientFunds.http_status(), 400);
        assert_eq!(Error::DuplicateOrder.http_status(), 409);
        assert_eq!(Error::ContentionTimeout.http_status(), 429);
        assert_eq!(Error::NotFound("order").http_status(), 404);
        assert_eq!(Error::Database("boom".into()).http_status(), 500);
    }

    #[test]
    fn guard_losers_are_retryable() {
        assert!(Error::ConcurrentRequest.is_retryable());
        assert!(Error::ContentionTimeout.is_retryable());
        assert!(!Error::InsufficientFunds.is_retryable());
    }
}
