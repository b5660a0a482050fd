pub mod api;
pub mod attachment;
pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod state;
pub mod stream;
pub mod transport;

// Re-export main types for convenience
pub use api::ApiClient;
pub use attachment::{PlainTextExtractor, TextExtractor};
pub use config::Config;
pub use error::ApiError;
pub use export::{download_artifact, ArtifactDownload, DocumentConverter, ExportFormat, Exporter};
pub use session::{ConversationSession, OpenOutcome, SendOutcome, SendPhase, StreamEnd};
pub use state::{
    AttachedFile, ChatRole, ConversationDetail, ConversationMessage, ConversationState,
    ConversationSummary, StoredMessage, StreamFragment,
};
pub use stream::FragmentDecoder;
pub use transport::{ChunkSource, MessageTransport, NewMessage};
