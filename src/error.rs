//! Error types for fundamentus_dash
//!
//! Input errors are shown to the user as status messages and never touch
//! the selection state. Client errors come from the backend boundary.

use thiserror::Error;

/// Validation errors for user input.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Enter at least one ticker code")]
    NoTickers,

    #[error("Select a portfolio")]
    NoPortfolioSelected,

    #[error("Unknown portfolio: {0}")]
    UnknownPortfolio(String),

    #[error("Select a file first")]
    NoFileSelected,

    #[error("Unsupported file '{0}', use .csv, .xls or .xlsx")]
    UnsupportedFile(String),

    #[error("No valid tickers found in the file")]
    NoTickersInFile,

    #[error("Enter a name for the portfolio")]
    PortfolioNameRequired,

    #[error("Load tickers first")]
    NothingLoaded,

    #[error("Select a ticker first")]
    NoTickerSelected,

    #[error("Ticker {0} is not loaded")]
    TickerNotLoaded(String),
}

/// Failures talking to the backend or reading a local upload.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("could not read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_messages_are_user_facing() {
        assert_eq!(
            InputError::UnknownPortfolio("Dividendos".to_string()).to_string(),
            "Unknown portfolio: Dividendos"
        );
        assert_eq!(
            InputError::TickerNotLoaded("ITUB4".to_string()).to_string(),
            "Ticker ITUB4 is not loaded"
        );
    }

    #[test]
    fn test_status_error_carries_detail() {
        let err = ClientError::Status {
            status: 500,
            detail: "Formato inválido".to_string(),
        };
        assert_eq!(err.to_string(), "backend returned 500: Formato inválido");
    }

    #[test]
    fn test_file_error_mentions_path() {
        let err = ClientError::File {
            path: "carteira.csv".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("carteira.csv"));
    }
}
