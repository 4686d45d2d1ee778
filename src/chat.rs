//! One question-answer exchange at a time.
//!
//! A [`ChatSession`] holds everything that stays fixed across turns (model,
//! retriever, prompt format, budget, mode). The conversation itself is a
//! [`History`] value the caller passes in and gets back, so a session never
//! carries hidden state between turns.

use tracing::{debug, warn};

use crate::conversation_log::ConversationLog;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::models::History;
use crate::prompt::{assemble, Mode, PromptFormat, DEFAULT_TOKEN_BUDGET};
use crate::retriever::{Retriever, DEFAULT_TOP_K};

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    /// The input history plus this exchange.
    pub history: History,
}

pub struct ChatSession {
    model: Box<dyn LanguageModel>,
    retriever: Option<Retriever>,
    format: PromptFormat,
    system_message: String,
    token_budget: usize,
    top_k: usize,
    mode: Mode,
    log: Option<ConversationLog>,
}

impl ChatSession {
    pub fn new(model: Box<dyn LanguageModel>, format: PromptFormat) -> Self {
        Self {
            model,
            retriever: None,
            format,
            system_message: String::new(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            top_k: DEFAULT_TOP_K,
            mode: Mode::Default,
            log: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Retriever, top_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_log(mut self, log: ConversationLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Run one exchange. Blank input returns `Ok(None)` without touching the
    /// retriever or the model.
    pub fn turn(&self, history: &History, input: &str) -> Result<Option<TurnOutcome>> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        let prompt = self.build_prompt(history, input)?;
        self.complete_turn(history, input, &prompt).map(Some)
    }

    /// Assemble the prompt that [`ChatSession::turn`] would send for `input`.
    pub fn build_prompt(&self, history: &History, input: &str) -> Result<String> {
        let system = match &self.retriever {
            Some(retriever) => {
                let context = retriever.retrieve(input, self.top_k)?;
                debug!(chunks = context.len(), "Retrieved context");
                with_context(&self.system_message, &context)
            }
            None => self.system_message.clone(),
        };
        Ok(assemble(
            history.turns(),
            &self.mode.wrap(input),
            &system,
            self.format,
            self.token_budget,
        ))
    }

    /// Send an already-assembled `prompt` and record the exchange.
    pub fn complete_turn(&self, history: &History, input: &str, prompt: &str) -> Result<TurnOutcome> {
        let reply = self.model.complete(prompt).map_err(RagError::Model)?;
        if let Some(log) = &self.log {
            if let Err(e) = log.append(input, &reply) {
                warn!(path = %log.path().display(), error = %e, "Could not write conversation log");
            }
        }
        Ok(TurnOutcome {
            history: history.with_exchange(input, &reply),
            reply,
        })
    }
}

fn with_context(system_message: &str, context: &[String]) -> String {
    if context.is_empty() {
        return system_message.to_string();
    }
    format!("{}\n\nContext:\n{}", system_message, context.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationTurn, Role};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every prompt and answers with a counter.
    struct Recorder {
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl LanguageModel for Recorder {
        fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            let mut prompts = self.prompts.borrow_mut();
            prompts.push(prompt.to_string());
            Ok(format!("reply {}", prompts.len()))
        }
    }

    struct Broken;

    impl LanguageModel for Broken {
        fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("backend offline")
        }
    }

    fn session(format: PromptFormat) -> (ChatSession, Rc<RefCell<Vec<String>>>) {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let model = Recorder {
            prompts: prompts.clone(),
        };
        (
            ChatSession::new(Box::new(model), format).with_system_message("S"),
            prompts,
        )
    }

    #[test]
    fn blank_input_skips_the_model() {
        let (chat, prompts) = session(PromptFormat::PlainText);
        assert!(chat.turn(&History::new(), "  \n\t").unwrap().is_none());
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn turns_thread_history() {
        let (chat, prompts) = session(PromptFormat::PlainText);
        let first = chat.turn(&History::new(), "Hi").unwrap().unwrap();
        assert_eq!(first.reply, "reply 1");
        let second = chat.turn(&first.history, "Again").unwrap().unwrap();

        assert_eq!(prompts.borrow()[0], "S\nUser: Hi");
        assert_eq!(
            prompts.borrow()[1],
            "S\nUser: Hi\nAssistant: reply 1\nUser: Again"
        );
        assert_eq!(second.history.len(), 4);
        assert_eq!(
            second.history.turns()[3],
            ConversationTurn::new(Role::Assistant, "reply 2")
        );
    }

    #[test]
    fn mode_wraps_prompt_but_history_keeps_raw_input() {
        let (chat, prompts) = session(PromptFormat::PlainText);
        let chat = chat.with_mode(Mode::Summarize);
        let outcome = chat.turn(&History::new(), "long text").unwrap().unwrap();
        assert_eq!(prompts.borrow()[0], "S\nUser: Summarize this content:\nlong text");
        assert_eq!(outcome.history.turns()[0].message, "long text");
    }

    #[test]
    fn model_failure_is_model_error() {
        let chat = ChatSession::new(Box::new(Broken), PromptFormat::TagDelimited);
        let err = chat.turn(&History::new(), "hello").unwrap_err();
        assert!(matches!(err, RagError::Model(_)));
        assert!(err.to_string().contains("backend offline"));
    }

    #[test]
    fn context_joins_chunks_under_system_message() {
        assert_eq!(with_context("S", &[]), "S");
        assert_eq!(
            with_context("S", &["one".to_string(), "two".to_string()]),
            "S\n\nContext:\none\ntwo"
        );
    }
}
