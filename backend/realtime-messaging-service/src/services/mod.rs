pub mod conversation_store;
pub mod credential_cipher;
pub mod directory;
pub mod notification_dispatcher;

pub use conversation_store::{assemble_conversations, ConversationStore};
pub use credential_cipher::{CipherError, CredentialCipher};
pub use directory::{AppRecord, Directory, StoreDirectory, UserProfile};
pub use notification_dispatcher::{
    DispatchError, DispatchOutcome, FanOutReport, NotificationDispatcher, PostActivity,
    PushGateway, TagOutcome,
};
