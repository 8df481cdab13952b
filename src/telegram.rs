use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::notify::{ChatId, Notifier, NotifyError};

const API_BASE: &str = "https://api.telegram.org";

pub const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    disable_notification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<&'a [InlineButton]>,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", API_BASE, bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, NotifyError> {
        let response: ApiResponse<T> = request.send().await?.json().await?;
        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(NotifyError::Rejected(
                response.description.unwrap_or_else(|| "no description".into()),
            )),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, NotifyError> {
        let request = self.client.get(self.url("getUpdates")).query(&[
            ("offset", offset.to_string()),
            ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ("allowed_updates", r#"["message","callback_query"]"#.to_string()),
        ]);
        self.call(request).await
    }

    pub async fn send_keyboard(
        &self,
        target: ChatId,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: target,
            text,
            disable_notification: false,
            reply_markup: Some(InlineKeyboard { inline_keyboard: vec![buttons] }),
        };
        let request = self.client.post(self.url("sendMessage")).json(&payload);
        self.call::<serde_json::Value>(request).await.map(|_| ())
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), NotifyError> {
        let request = self
            .client
            .post(self.url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }));
        self.call::<bool>(request).await.map(|_| ())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_text(&self, target: ChatId, message: &str, silent: bool) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: target,
            text: message,
            disable_notification: silent,
            reply_markup: None,
        };
        let request = self.client.post(self.url("sendMessage")).json(&payload);
        self.call::<serde_json::Value>(request).await.map(|_| ())
    }

    async fn send_document(
        &self,
        target: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), NotifyError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("chat_id", target.to_string())
            .text("caption", caption.to_string())
            .part("document", part);
        let request = self.client.post(self.url("sendDocument")).multipart(form);
        self.call::<serde_json::Value>(request).await.map(|_| ())
    }
}
