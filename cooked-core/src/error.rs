use crate::bridge::MessageKind;
use cooked_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),

    #[error("Channel closed by peer")]
    ChannelClosed,

    #[error("Unexpected reply from leader: {0}")]
    UnexpectedReply(String),

    #[error("Extension bridge error: {0}")]
    Bridge(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Corpus line {line}: {reason}")]
    Corpus { line: usize, reason: String },

    #[error("A '{0}' handler is already waiting")]
    HandlerBusy(MessageKind),
}

pub type Result<T> = std::result::Result<T, CoreError>;
