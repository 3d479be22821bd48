use thiserror::Error;

/// Errors that can occur when fetching or parsing VAST XML
#[derive(Error, Debug)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(#[from] quick_xml::Error),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to fetch {uri}: {reason}")]
    FetchFailed { uri: String, reason: String },

    #[error("Wrapper chain exceeded {0} redirects")]
    TooManyRedirects(u32),

    #[error("Wrapper chain revisits {0}")]
    WrapperCycle(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VastError>;

/// Errors surfaced by the player and its renderers
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The VAST document could not be fetched or parsed, after all fallbacks
    #[error("VAST fetch failed: {0}")]
    Fetch(#[from] VastError),

    #[error("No renderer can play this ad: {0}")]
    Selection(String),

    #[error("There are no playable media files.")]
    NoPlayableMedia,

    #[error("VASTPlayer not ready.")]
    NotReady,

    #[error("The {0} has not been loaded.")]
    NotLoaded(&'static str),

    #[error("The ad has already been started.")]
    AlreadyStarted,

    #[error("The ad has not been started yet.")]
    NotStarted,

    #[error("The ad has been stopped.")]
    Stopped,

    #[error("A load is already in progress.")]
    LoadInProgress,

    /// The native media element reported an error
    #[error("Media error: {0}")]
    Media(String),

    #[error("VPAID error: {0}")]
    Vpaid(String),
}

impl PlayerError {
    /// Whether the next fallback URI should be tried after this error
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, PlayerError::Fetch(_))
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
