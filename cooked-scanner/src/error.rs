use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed URL '{url}': {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsuccessful status: {0}")]
    Status(u16),

    #[error("Not an HTML page (content type: {})", .0.as_deref().unwrap_or("none"))]
    NotHtml(Option<String>),

    #[error("Request timed out")]
    Timeout,

    #[error("No scheme responded for site {0}")]
    ProtocolResolution(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
