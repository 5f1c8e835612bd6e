pub mod auth;
pub mod messages;
pub mod send;

pub use auth::{GmailAuth, GmailAuthConfig, GmailAuthError};
pub use messages::{
    decode_base64url, GmailClient, GmailError, Message, MessageHeader, MessagePart,
    MessagePartBody, MessagePayload, MessageRef,
};
pub use send::{OutboundReply, SendResponse};
