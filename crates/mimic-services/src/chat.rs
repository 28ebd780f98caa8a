//! Conversational replies through Anthropic's Messages API
//!
//! Conversations are kept in a [`Store`] keyed by conversation id. Each call
//! to [`ChatService::chat`] appends the user message and the reply, and sends
//! at most the last [`CHAT_HISTORY_WINDOW`] prior messages as context.

use crate::error::{ServiceError, ServiceResult};
use crate::http::{build_client, check_status};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mimic_core::constants::CHAT_HISTORY_WINDOW;
use mimic_core::{ChatMessage, ChatRole, Conversation};
use mimic_storage::{MemoryStore, Store};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const SERVICE: &str = "anthropic";

pub const MAX_MESSAGE_CHARS: usize = 2000;

const SYSTEM_PROMPT: &str = "あなたは親しみやすいAIアバターです。
ユーザーとの会話を自然に行い、質問に答えたり、雑談を楽しんだりします。

以下のガイドラインに従ってください：
- 日本語で自然に会話してください
- 簡潔で分かりやすい回答を心がけてください
- 適度に感情を表現してください
- 不適切な内容や有害な情報は提供しないでください
- 回答は音声で読み上げられるため、読みやすい長さにしてください（通常2-3文程度）
";

const APOLOGY_REPLY: &str = "申し訳ありません、エラーが発生しました。もう一度お試しください。";
const REJECTED_CONTENT: &str = "不適切な内容が検出されました。";

const GREETING_KEYWORDS: [&str; 4] = ["こんにちは", "はじめまして", "hello", "hi"];

const GREETING_REPLIES: [&str; 3] = [
    "こんにちは！今日はどんなお話をしましょうか？",
    "やあ！元気ですか？",
    "いらっしゃい！何でも聞いてくださいね。",
];

const QUESTION_REPLIES: [&str; 2] = [
    "良い質問ですね！考えてみましょう。",
    "その質問は面白いですね。私の考えでは...",
];

const DEFAULT_REPLIES: [&str; 4] = [
    "こんにちは！何かお手伝いできることはありますか？",
    "はい、お話を聞いていますよ。",
    "なるほど、興味深いですね！",
    "それについてもっと教えていただけますか？",
];

/// System prompt for the avatar, with `persona` appended when given.
pub fn system_prompt(persona: Option<&str>) -> String {
    match persona {
        Some(persona) => format!("{}\n\n追加の人格設定:\n{}", SYSTEM_PROMPT, persona),
        None => SYSTEM_PROMPT.to_string(),
    }
}

/// Canned reply used when no model is configured.
///
/// Greetings win over questions; within a category the reply is picked by
/// message length so the same input always gets the same answer.
pub fn demo_reply(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    let replies: &[&str] = if GREETING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        &GREETING_REPLIES
    } else if message.contains('?') || message.contains('？') {
        &QUESTION_REPLIES
    } else {
        &DEFAULT_REPLIES
    };
    replies[message.chars().count() % replies.len()]
}

/// A model producing the assistant's next message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, system: &str, messages: &[ChatMessage]) -> ServiceResult<String>;
}

pub struct AnthropicClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl Debug for AnthropicClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AnthropicClient")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: ChatRole,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            base_url: API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatModel for AnthropicClient {
    #[tracing::instrument(skip_all, fields(service = SERVICE, model = %self.model, messages = messages.len()))]
    async fn reply(&self, system: &str, messages: &[ChatMessage]) -> ServiceResult<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: messages
                .iter()
                .map(|m| MessageParam {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;

        let parsed: MessagesResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(ServiceError::http(SERVICE))?;

        parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .ok_or_else(|| ServiceError::Api {
                service: SERVICE,
                status: 200,
                message: "response contained no text".to_string(),
            })
    }
}

/// Result of one chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: ChatMessage,
    pub response: ChatMessage,
}

pub struct ChatService {
    model: Option<Arc<dyn ChatModel>>,
    conversations: Arc<dyn Store<Conversation>>,
    blocklist: Vec<String>,
}

impl ChatService {
    /// `model = None` selects demo replies.
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            model,
            conversations: Arc::new(MemoryStore::new()),
            blocklist: Vec::new(),
        }
    }

    pub fn with_store(mut self, conversations: Arc<dyn Store<Conversation>>) -> Self {
        self.conversations = conversations;
        self
    }

    /// Case-insensitive substrings that make [`filter_content`](Self::filter_content) reject a message.
    pub fn with_blocklist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocklist = patterns
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    pub fn is_demo(&self) -> bool {
        self.model.is_none()
    }

    pub fn filter_content(&self, text: &str) -> ServiceResult<()> {
        let lower = text.to_lowercase();
        if self.blocklist.iter().any(|p| lower.contains(p.as_str())) {
            return Err(ServiceError::ContentRejected(REJECTED_CONTENT.to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, persona: Option<String>) -> ServiceResult<String> {
        let id = Uuid::new_v4().to_string();
        self.conversations
            .put(&id, Conversation::new(&id, persona))
            .await?;
        Ok(id)
    }

    /// Reply to `message` within `conversation_id`, starting a new
    /// conversation when the id is missing or unknown.
    #[tracing::instrument(skip(self, message), fields(chars = message.chars().count()))]
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> ServiceResult<ChatReply> {
        let chars = message.chars().count();
        if chars == 0 || chars > MAX_MESSAGE_CHARS {
            return Err(ServiceError::InvalidRequest(format!(
                "Message must be between 1 and {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let existing = match conversation_id {
            Some(id) => self.conversations.get(id).await?,
            None => None,
        };
        let conversation = match existing {
            Some(conversation) => conversation,
            None => {
                let id = self.create(None).await?;
                self.conversations
                    .get(&id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Conversation".to_string()))?
            }
        };

        let user_message = ChatMessage::user(message);
        let reply_text = match &self.model {
            Some(model) => {
                let mut context = conversation.recent(CHAT_HISTORY_WINDOW).to_vec();
                context.push(user_message.clone());
                let system = system_prompt(conversation.persona.as_deref());
                match model.reply(&system, &context).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(conversation_id = %conversation.id, error = %e, "Chat model failed, replying with apology");
                        APOLOGY_REPLY.to_string()
                    }
                }
            }
            None => demo_reply(message).to_string(),
        };
        let response = ChatMessage::assistant(reply_text);

        let mut pair = Some((user_message.clone(), response.clone()));
        let found = self
            .conversations
            .update(&conversation.id, &mut |c: &mut Conversation| {
                if let Some((user, reply)) = pair.take() {
                    c.messages.push(user);
                    c.messages.push(reply);
                    c.updated_at = Utc::now();
                }
            })
            .await?;
        if !found {
            return Err(ServiceError::NotFound("Conversation".to_string()));
        }

        info!(conversation_id = %conversation.id, "Chat reply generated");
        Ok(ChatReply {
            conversation_id: conversation.id,
            message: user_message,
            response,
        })
    }

    pub async fn history(&self, conversation_id: &str) -> ServiceResult<Option<Conversation>> {
        Ok(self.conversations.get(conversation_id).await?)
    }

    /// Empty the message log, keeping the conversation and its persona.
    pub async fn clear(&self, conversation_id: &str) -> ServiceResult<bool> {
        Ok(self
            .conversations
            .update(conversation_id, &mut |c: &mut Conversation| {
                c.messages.clear();
                c.updated_at = Utc::now();
            })
            .await?)
    }

    pub async fn delete(&self, conversation_id: &str) -> ServiceResult<bool> {
        Ok(self.conversations.delete(conversation_id).await?.is_some())
    }

    /// Attach generated media to the latest assistant message.
    pub async fn annotate_reply(
        &self,
        conversation_id: &str,
        audio_path: Option<std::path::PathBuf>,
        video_id: Option<String>,
    ) -> ServiceResult<bool> {
        let mut media = Some((audio_path, video_id));
        Ok(self
            .conversations
            .update(conversation_id, &mut |c: &mut Conversation| {
                let last = c
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|m| m.role == ChatRole::Assistant);
                if let (Some(message), Some((audio, video))) = (last, media.take()) {
                    message.audio_path = audio;
                    message.video_id = video;
                }
            })
            .await?)
    }

    /// Drop conversations not touched since `cutoff`.
    pub async fn evict_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize> {
        let mut evicted = 0;
        for (id, conversation) in self.conversations.scan().await? {
            if conversation.updated_at < cutoff && self.conversations.delete(&id).await?.is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the context it was given and answers with a fixed text.
    struct Recorder {
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
        fail: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl ChatModel for Recorder {
        async fn reply(&self, system: &str, messages: &[ChatMessage]) -> ServiceResult<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec()));
            if self.fail {
                return Err(ServiceError::Api {
                    service: SERVICE,
                    status: 529,
                    message: "Overloaded".to_string(),
                });
            }
            Ok(format!("reply {}", messages.len()))
        }
    }

    #[test]
    fn test_demo_reply_categories() {
        assert!(GREETING_REPLIES.contains(&demo_reply("こんにちは")));
        assert!(GREETING_REPLIES.contains(&demo_reply("Hello there?")));
        assert!(QUESTION_REPLIES.contains(&demo_reply("元気ですか？")));
        assert!(QUESTION_REPLIES.contains(&demo_reply("why?")));
        assert!(DEFAULT_REPLIES.contains(&demo_reply("今日は晴れ")));
        assert_eq!(demo_reply("今日は晴れ"), demo_reply("今日は晴れ"));
    }

    #[test]
    fn test_system_prompt_persona() {
        assert!(system_prompt(None).starts_with("あなたは親しみやすいAIアバターです。"));
        assert!(system_prompt(Some("猫が好き")).ends_with("\n\n追加の人格設定:\n猫が好き"));
    }

    #[tokio::test]
    async fn test_unknown_conversation_starts_new() {
        let svc = ChatService::new(None);
        let reply = svc.chat("こんにちは", Some("does-not-exist")).await.unwrap();
        assert_ne!(reply.conversation_id, "does-not-exist");

        let conv = svc.history(&reply.conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, ChatRole::User);
        assert_eq!(conv.messages[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_context_window_and_persona() {
        let model = Recorder::new(false);
        let svc = ChatService::new(Some(model.clone()));
        let id = svc.create(Some("関西弁で話す".to_string())).await.unwrap();

        for i in 0..7 {
            svc.chat(&format!("message {}", i), Some(&id)).await.unwrap();
        }

        let seen = model.seen.lock().unwrap();
        // First call: just the new message. Later calls cap prior history at 10.
        assert_eq!(seen[0].1.len(), 1);
        assert_eq!(seen[6].1.len(), CHAT_HISTORY_WINDOW + 1);
        assert_eq!(seen[6].1.last().unwrap().content, "message 6");
        assert_eq!(seen[6].1[0].content, "message 1");
        assert!(seen[6].0.contains("関西弁で話す"));

        let conv = svc.history(&id).await.unwrap().unwrap();
        assert_eq!(conv.messages.len(), 14);
    }

    #[tokio::test]
    async fn test_model_failure_replies_with_apology() {
        let svc = ChatService::new(Some(Recorder::new(true)));
        let reply = svc.chat("hello", None).await.unwrap();
        assert_eq!(reply.response.content, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn test_message_length_limits() {
        let svc = ChatService::new(None);
        assert!(matches!(
            svc.chat("", None).await,
            Err(ServiceError::InvalidRequest(_))
        ));
        assert!(svc.chat(&"あ".repeat(2000), None).await.is_ok());
        assert!(svc.chat(&"あ".repeat(2001), None).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_and_delete() {
        let svc = ChatService::new(None);
        let reply = svc.chat("hi", None).await.unwrap();
        let id = reply.conversation_id;

        assert!(svc.clear(&id).await.unwrap());
        assert!(svc.history(&id).await.unwrap().unwrap().messages.is_empty());
        assert!(svc.delete(&id).await.unwrap());
        assert!(!svc.delete(&id).await.unwrap());
        assert!(!svc.clear(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_annotate_reply() {
        let svc = ChatService::new(None);
        let id = svc.chat("hi", None).await.unwrap().conversation_id;
        svc.annotate_reply(&id, Some("/out/voice/a.mp3".into()), Some("task-1".to_string()))
            .await
            .unwrap();
        let conv = svc.history(&id).await.unwrap().unwrap();
        assert_eq!(conv.messages[1].video_id.as_deref(), Some("task-1"));
        assert!(conv.messages[0].video_id.is_none());
    }

    #[test]
    fn test_filter_content() {
        let svc = ChatService::new(None).with_blocklist(["BadWord"]);
        assert!(svc.filter_content("a normal message").is_ok());
        let err = svc.filter_content("this has a badword in it").unwrap_err();
        assert_eq!(err.to_string(), REJECTED_CONTENT);
    }

    #[tokio::test]
    async fn test_evict_before() {
        let svc = ChatService::new(None);
        let id = svc.create(None).await.unwrap();
        assert_eq!(svc.evict_before(Utc::now() - chrono::Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(svc.evict_before(Utc::now() + chrono::Duration::seconds(1)).await.unwrap(), 1);
        assert!(svc.history(&id).await.unwrap().is_none());
    }
}
