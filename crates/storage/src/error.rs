use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("session backend rejected credentials on `{stage}`"))]
    Unauthorized { stage: &'static str },
    #[snafu(display("session fetch returned status {status}: {body}"))]
    FetchStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("session save returned status {status}: {body}"))]
    SaveStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to build session backend url from '{base_url}'"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
    },
    #[snafu(display("session backend transport failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode session payload on `{stage}`, {source}"))]
    DecodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode session payload on `{stage}`, {source}"))]
    EncodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to create session store directory at {path}"))]
    CreateStoreDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read session store from {path}"))]
    ReadStore {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write session store to {path}"))]
    WriteStore {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace session store from {from} to {to}"))]
    RenameStore {
        stage: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Response status if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::FetchStatus { status, .. } | Self::SaveStatus { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
