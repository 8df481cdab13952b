use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Telegram chat id. Other transports map their own targets onto it.
pub type ChatId = i64;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat API rejected the request: {0}")]
    Rejected(String),
}

/// Outbound side of the chat interface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, target: ChatId, message: &str, silent: bool) -> Result<(), NotifyError>;

    async fn send_document(
        &self,
        target: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), NotifyError>;
}

/// Fallback used when no bot token is configured: messages go to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, target: ChatId, message: &str, silent: bool) -> Result<(), NotifyError> {
        info!(target_chat = target, silent, "{}", message);
        Ok(())
    }

    async fn send_document(
        &self,
        target: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), NotifyError> {
        info!(target_chat = target, file_name, bytes = bytes.len(), "{}", caption);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text { target: ChatId, message: String, silent: bool },
        Document { target: ChatId, file_name: String, body: String },
    }

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { message, .. } => Some(message),
                    Sent::Document { .. } => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, target: ChatId, message: &str, silent: bool) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(Sent::Text {
                target,
                message: message.to_string(),
                silent,
            });
            Ok(())
        }

        async fn send_document(
            &self,
            target: ChatId,
            file_name: &str,
            bytes: Vec<u8>,
            _caption: &str,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(Sent::Document {
                target,
                file_name: file_name.to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
            Ok(())
        }
    }
}
