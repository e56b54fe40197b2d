//! Mentor chat session.
//!
//! # Responsibility
//! - Show a persona-indexed greeting without any network call.
//! - Run one remote exchange per message, at most one at a time.
//! - Merge suggested tasks and grant the engagement reward on success.
//!
//! # Invariants
//! - A failed, timed-out or undecodable exchange shows the canned tip and
//!   grants no XP.
//! - A second message while one is in flight is rejected, never interleaved.
//! - Logs carry the session id and sizes only, never message text.

use crate::config::MentorSettings;
use crate::model::persona::Persona;
use crate::service::progression_service::{
    ProgressionEngine, ProgressionError, XpAward, MENTOR_ENGAGEMENT_XP,
};
use crate::service::task_service::{TaskError, TaskQueue};
use crate::session::SessionContext;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Shown when the exchange fails.
pub const FALLBACK_TIP: &str = "Desculpe, houve um erro. Aqui vai uma dica rápida: que tal listar 3 coisas que você gosta de fazer todos os dias?";
/// Shown when the backend answers without `text` or `diagnosis`.
pub const EMPTY_REPLY_TEXT: &str =
    "Não consegui formular uma resposta agora. Pode me contar um pouco mais sobre o que você precisa?";

/// Static greeting for a freshly opened session.
pub fn greeting(persona: Persona) -> &'static str {
    match persona {
        Persona::Game => {
            "Pronto para o desafio? Vou montar uma missão rápida pra você ganhar XP!"
        }
        Persona::Mentor => {
            "Vamos refletir sobre seu propósito. Conte-me o que te fez levantar hoje."
        }
        Persona::Balanced => {
            "Oi! Como posso te ajudar hoje? Quer uma missão prática ou uma reflexão profunda?"
        }
    }
}

/// Request body posted to the mentor endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentorRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub message: String,
    pub persona: Persona,
}

/// Task suggestion: either a bare title or `{ "title": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SuggestedTask {
    Title(String),
    Object { title: String },
}

impl SuggestedTask {
    pub fn title(&self) -> &str {
        match self {
            Self::Title(title) | Self::Object { title } => title,
        }
    }
}

/// Response body returned by the mentor endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MentorReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<SuggestedTask>>,
}

impl MentorReply {
    /// Text to display: `text`, then `diagnosis`, then a stock sentence.
    pub fn display_text(&self) -> &str {
        [self.text.as_deref(), self.diagnosis.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or(EMPTY_REPLY_TEXT)
    }

    pub fn suggested_titles(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .flatten()
            .map(SuggestedTask::title)
            .collect()
    }
}

#[derive(Debug)]
pub enum MentorError {
    EmptyMessage,
    /// Another message of this session is still in flight.
    SessionBusy,
    Timeout,
    Transport(String),
    Decode(String),
    Tasks(TaskError),
    Progression(ProgressionError),
}

impl MentorError {
    /// Whether this failure belongs to the remote exchange itself.
    pub fn is_exchange_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_) | Self::Decode(_))
    }
}

impl Display for MentorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "mentor message cannot be empty"),
            Self::SessionBusy => write!(f, "a mentor message is already in flight"),
            Self::Timeout => write!(f, "mentor endpoint timed out"),
            Self::Transport(message) => write!(f, "mentor endpoint unreachable: {message}"),
            Self::Decode(message) => write!(f, "mentor reply could not be decoded: {message}"),
            Self::Tasks(err) => write!(f, "{err}"),
            Self::Progression(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MentorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tasks(err) => Some(err),
            Self::Progression(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskError> for MentorError {
    fn from(value: TaskError) -> Self {
        Self::Tasks(value)
    }
}

impl From<ProgressionError> for MentorError {
    fn from(value: ProgressionError) -> Self {
        Self::Progression(value)
    }
}

/// Remote completion call.
pub trait MentorTransport {
    fn complete(&self, request: &MentorRequest) -> Result<MentorReply, MentorError>;
}

/// Blocking HTTP transport with a hard timeout.
pub struct HttpMentorTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpMentorTransport {
    pub fn new(settings: &MentorSettings) -> Result<Self, MentorError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|err| MentorError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

impl MentorTransport for HttpMentorTransport {
    fn complete(&self, request: &MentorRequest) -> Result<MentorReply, MentorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(classify_reqwest_error)?;

        response
            .json::<MentorReply>()
            .map_err(|err| MentorError::Decode(err.to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> MentorError {
    if err.is_timeout() {
        MentorError::Timeout
    } else {
        MentorError::Transport(err.to_string())
    }
}

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Mentor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

/// Result of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentorOutcome {
    /// Text shown for the mentor's turn.
    pub reply: String,
    /// `true` when the canned tip replaced a failed exchange.
    pub degraded: bool,
    pub added_tasks: usize,
    /// Engagement reward; `None` on a degraded exchange.
    pub award: Option<XpAward>,
}

/// One chat session.
pub struct MentorSession<T: MentorTransport> {
    transport: T,
    session_id: Uuid,
    in_flight: AtomicBool,
    transcript: Mutex<Vec<ChatMessage>>,
}

impl<T: MentorTransport> MentorSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session_id: Uuid::new_v4(),
            in_flight: AtomicBool::new(false),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Clears the transcript and shows the persona greeting.
    pub fn open(&self, persona: Persona) -> &'static str {
        let text = greeting(persona);
        let mut transcript = self.lock_transcript();
        transcript.clear();
        transcript.push(ChatMessage {
            speaker: Speaker::Mentor,
            text: text.to_string(),
        });
        text
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.lock_transcript().clone()
    }

    /// Sends one message and applies the reply.
    ///
    /// Exchange failures are absorbed into a degraded outcome; only input
    /// validation, a busy session and local persistence failures return
    /// `Err`.
    pub fn send_message(
        &self,
        text: &str,
        ctx: &SessionContext,
        tasks: &mut TaskQueue<'_>,
        progression: &ProgressionEngine<'_>,
    ) -> Result<MentorOutcome, MentorError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(MentorError::EmptyMessage);
        }
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(MentorError::SessionBusy)?;

        self.push(Speaker::User, message);
        let request = MentorRequest {
            user_id: ctx.user_id().to_string(),
            message: message.to_string(),
            persona: ctx.persona(),
        };

        let started_at = Instant::now();
        let reply = match self.transport.complete(&request) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    "event=mentor_exchange module=mentor status=degraded session={} duration_ms={} error={}",
                    self.session_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                self.push(Speaker::Mentor, FALLBACK_TIP);
                return Ok(MentorOutcome {
                    reply: FALLBACK_TIP.to_string(),
                    degraded: true,
                    added_tasks: 0,
                    award: None,
                });
            }
        };

        let shown = reply.display_text().to_string();
        self.push(Speaker::Mentor, &shown);

        let added_tasks = tasks.merge_suggested(reply.suggested_titles())?;
        let award = progression.award_xp(MENTOR_ENGAGEMENT_XP, ctx.identity())?;
        info!(
            "event=mentor_exchange module=mentor status=ok session={} duration_ms={} tasks_added={} xp={}",
            self.session_id,
            started_at.elapsed().as_millis(),
            added_tasks,
            award.xp
        );

        Ok(MentorOutcome {
            reply: shown,
            degraded: false,
            added_tasks,
            award: Some(award),
        })
    }

    fn push(&self, speaker: Speaker, text: &str) {
        self.lock_transcript().push(ChatMessage {
            speaker,
            text: text.to_string(),
        });
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{greeting, MentorReply, SuggestedTask, EMPTY_REPLY_TEXT};
    use crate::model::persona::Persona;

    #[test]
    fn greeting_depends_on_persona() {
        assert!(greeting(Persona::Game).contains("desafio"));
        assert!(greeting(Persona::Mentor).contains("refletir"));
        assert!(greeting(Persona::Balanced).contains("missão prática"));
    }

    #[test]
    fn reply_accepts_mixed_task_shapes() {
        let reply: MentorReply = serde_json::from_str(
            r#"{"diagnosis":"foco","tasks":["beber água",{"title":"alongar"}]}"#,
        )
        .expect("reply decodes");
        assert_eq!(reply.display_text(), "foco");
        assert_eq!(reply.suggested_titles(), ["beber água", "alongar"]);
        assert_eq!(
            reply.tasks.as_deref().map(<[SuggestedTask]>::len),
            Some(2)
        );
    }

    #[test]
    fn reply_without_text_uses_stock_sentence() {
        let reply: MentorReply = serde_json::from_str("{}").expect("empty reply decodes");
        assert_eq!(reply.display_text(), EMPTY_REPLY_TEXT);
        assert!(reply.suggested_titles().is_empty());

        let blank: MentorReply =
            serde_json::from_str(r#"{"text":"  ","diagnosis":"ok"}"#).expect("decodes");
        assert_eq!(blank.display_text(), "ok");
    }

    #[test]
    fn null_tasks_decode_as_none() {
        let reply: MentorReply =
            serde_json::from_str(r#"{"text":"oi","tasks":null}"#).expect("decodes");
        assert!(reply.suggested_titles().is_empty());
    }
}
