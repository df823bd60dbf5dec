use thiserror::Error;

use crate::model::{ChannelId, ItemId};

/// Failures reported by a [`RemoteStore`](crate::remote::RemoteStore).
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Root folder '{0}' not found")]
    RootNotFound(String),

    #[error("Failed to list root folder '{name}': {source}")]
    RootListing {
        name: String,
        #[source]
        source: RemoteError,
    },
}

#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("Failed to open channel {channel_id} on {target}: {source}")]
    Remote {
        channel_id: ChannelId,
        target: ItemId,
        #[source]
        source: RemoteError,
    },

    #[error("Resource {0} already has an active channel")]
    AlreadyWatched(ItemId),

    #[error("Channel {channel_id} was opened but could not be registered: {source}")]
    Unregistered {
        channel_id: ChannelId,
        #[source]
        source: RegistryError,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Channel id {0} is already registered")]
    DuplicateChannel(ChannelId),

    #[error("Resource {0} already has a registered channel")]
    DuplicateResource(ItemId),
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
