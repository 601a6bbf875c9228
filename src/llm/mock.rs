//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预先写好的回复；脚本耗尽后返回错误。记录每次收到的消息便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的全部请求
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        self.replies
            .lock()
            .map_err(|e| LlmError::Api(e.to_string()))?
            .pop_front()
            .ok_or(LlmError::ScriptExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_in_order() {
        let mock = MockLlmClient::scripted(["first", "second"]);
        assert_eq!(mock.complete(&[Message::user("a")]).await.unwrap(), "first");
        assert_eq!(mock.complete(&[Message::user("b")]).await.unwrap(), "second");
        assert!(matches!(
            mock.complete(&[Message::user("c")]).await,
            Err(LlmError::ScriptExhausted)
        ));
        assert_eq!(mock.requests().len(), 3);
    }
}
