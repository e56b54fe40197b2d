use ascend_core::db::open_db_in_memory;
use ascend_core::service::mentor_service::{Speaker, EMPTY_REPLY_TEXT};
use ascend_core::{
    greeting, AuthenticatedUser, LocalState, MentorError, MentorReply, MentorRequest,
    MentorSession, MentorTransport, Persona, ProfileStore, ProgressionEngine, SessionContext,
    SqliteLocalStore, SqliteProfileStore, TaskQueue, FALLBACK_TIP,
};
use std::sync::{Barrier, Mutex};

/// Replies with a fixed JSON body and records every request.
struct ScriptedTransport {
    body: &'static str,
    seen: Mutex<Vec<MentorRequest>>,
}

impl ScriptedTransport {
    fn new(body: &'static str) -> Self {
        Self {
            body,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl MentorTransport for ScriptedTransport {
    fn complete(&self, request: &MentorRequest) -> Result<MentorReply, MentorError> {
        self.seen.lock().unwrap().push(request.clone());
        serde_json::from_str(self.body).map_err(|err| MentorError::Decode(err.to_string()))
    }
}

struct FailingTransport(fn() -> MentorError);

impl MentorTransport for FailingTransport {
    fn complete(&self, _request: &MentorRequest) -> Result<MentorReply, MentorError> {
        Err((self.0)())
    }
}

#[test]
fn successful_exchange_merges_tasks_and_awards_engagement_xp() {
    let conn = open_db_in_memory().unwrap();
    let local = SqliteLocalStore::new(&conn);
    let remote = SqliteProfileStore::new(&conn);
    let engine = ProgressionEngine::new(&local, &remote);
    let mut queue = TaskQueue::load(&local, &engine).unwrap();
    let ctx = SessionContext::new(Persona::Game);
    let session = MentorSession::new(ScriptedTransport::new(
        r#"{"text":"Missão aceita!","tasks":["10 flexões",{"title":"planejar o dia"}]}"#,
    ));

    assert_eq!(session.open(ctx.persona()), greeting(Persona::Game));
    let outcome = session
        .send_message("  quero subir de nível ", &ctx, &mut queue, &engine)
        .unwrap();

    assert_eq!(outcome.reply, "Missão aceita!");
    assert!(!outcome.degraded);
    assert_eq!(outcome.added_tasks, 2);
    assert_eq!(outcome.award.unwrap().xp, 5);
    let titles: Vec<&str> = queue.tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["10 flexões", "planejar o dia"]);

    let seen = session_requests(&session);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].user_id, "anon");
    assert_eq!(seen[0].message, "quero subir de nível");
    assert_eq!(seen[0].persona, Persona::Game);

    let transcript = session.transcript();
    let speakers: Vec<Speaker> = transcript.iter().map(|m| m.speaker).collect();
    assert_eq!(speakers, [Speaker::Mentor, Speaker::User, Speaker::Mentor]);
}

#[test]
fn request_body_uses_wire_field_names() {
    let request = MentorRequest {
        user_id: "uid-1".to_string(),
        message: "oi".to_string(),
        persona: Persona::Mentor,
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"userId": "uid-1", "message": "oi", "persona": "mentor"})
    );
}

#[test]
fn reply_without_text_still_awards_and_shows_stock_sentence() {
    let conn = open_db_in_memory().unwrap();
    let local = SqliteLocalStore::new(&conn);
    let remote = SqliteProfileStore::new(&conn);
    let engine = ProgressionEngine::new(&local, &remote);
    let mut queue = TaskQueue::load(&local, &engine).unwrap();
    let ctx = SessionContext::new(Persona::Balanced);
    let session = MentorSession::new(ScriptedTransport::new("{}"));

    let outcome = session
        .send_message("oi", &ctx, &mut queue, &engine)
        .unwrap();

    assert_eq!(outcome.reply, EMPTY_REPLY_TEXT);
    assert_eq!(outcome.added_tasks, 0);
    assert_eq!(LocalState::new(&local).xp().unwrap(), 5);
}

#[test]
fn failed_exchange_shows_fallback_and_leaves_xp_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let local = SqliteLocalStore::new(&conn);
    let remote = SqliteProfileStore::new(&conn);
    let engine = ProgressionEngine::new(&local, &remote);
    let mut queue = TaskQueue::load(&local, &engine).unwrap();
    let ctx = SessionContext::new(Persona::Mentor);
    engine.award_xp(40, None).unwrap();

    let failures: [fn() -> MentorError; 3] = [
        || MentorError::Timeout,
        || MentorError::Transport("connection refused".to_string()),
        || MentorError::Decode("expected value".to_string()),
    ];
    for failure in failures {
        let session = MentorSession::new(FailingTransport(failure));
        let outcome = session
            .send_message("me ajuda", &ctx, &mut queue, &engine)
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.reply, FALLBACK_TIP);
        assert_eq!(outcome.award, None);
        assert_eq!(session.transcript().last().unwrap().text, FALLBACK_TIP);
    }

    assert_eq!(LocalState::new(&local).xp().unwrap(), 40);
    assert!(queue.is_empty());
}

#[test]
fn authenticated_exchange_sends_uid_and_awards_remotely() {
    let conn = open_db_in_memory().unwrap();
    let local = SqliteLocalStore::new(&conn);
    let remote = SqliteProfileStore::new(&conn);
    let engine = ProgressionEngine::new(&local, &remote);
    let mut queue = TaskQueue::load(&local, &engine).unwrap();
    let mut ctx = SessionContext::new(Persona::Mentor);
    ctx.set_identity(Some(AuthenticatedUser::new("uid-chat")));
    let session = MentorSession::new(ScriptedTransport::new(r#"{"diagnosis":"Respire."}"#));

    let outcome = session
        .send_message("ansioso", &ctx, &mut queue, &engine)
        .unwrap();

    assert_eq!(outcome.reply, "Respire.");
    assert_eq!(session_requests(&session)[0].user_id, "uid-chat");
    assert_eq!(remote.get_profile("uid-chat").unwrap().unwrap().xp, Some(5));
}

#[test]
fn blank_message_is_rejected_before_any_call() {
    let conn = open_db_in_memory().unwrap();
    let local = SqliteLocalStore::new(&conn);
    let remote = SqliteProfileStore::new(&conn);
    let engine = ProgressionEngine::new(&local, &remote);
    let mut queue = TaskQueue::load(&local, &engine).unwrap();
    let ctx = SessionContext::new(Persona::Balanced);
    let session = MentorSession::new(ScriptedTransport::new(r#"{"text":"oi"}"#));

    let err = session
        .send_message("   ", &ctx, &mut queue, &engine)
        .unwrap_err();

    assert!(matches!(err, MentorError::EmptyMessage));
    assert!(session_requests(&session).is_empty());
    assert!(session.transcript().is_empty());
}

/// Blocks inside the exchange until released.
struct GatedTransport {
    entered: Barrier,
    release: Barrier,
}

impl MentorTransport for GatedTransport {
    fn complete(&self, _request: &MentorRequest) -> Result<MentorReply, MentorError> {
        self.entered.wait();
        self.release.wait();
        Ok(MentorReply {
            text: Some("pronto".to_string()),
            ..MentorReply::default()
        })
    }
}

#[test]
fn second_message_while_in_flight_is_rejected() {
    let session = MentorSession::new(GatedTransport {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let ctx = SessionContext::new(Persona::Game);

    std::thread::scope(|scope| {
        let first = scope.spawn(|| {
            let conn = open_db_in_memory().unwrap();
            let local = SqliteLocalStore::new(&conn);
            let remote = SqliteProfileStore::new(&conn);
            let engine = ProgressionEngine::new(&local, &remote);
            let mut queue = TaskQueue::load(&local, &engine).unwrap();
            session
                .send_message("primeira", &ctx, &mut queue, &engine)
                .map(|outcome| outcome.reply)
        });

        let conn = open_db_in_memory().unwrap();
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);
        let mut queue = TaskQueue::load(&local, &engine).unwrap();

        session.transport().entered.wait();
        let err = session
            .send_message("segunda", &ctx, &mut queue, &engine)
            .unwrap_err();
        assert!(matches!(err, MentorError::SessionBusy));
        assert_eq!(LocalState::new(&local).xp().unwrap(), 0);
        session.transport().release.wait();

        assert_eq!(first.join().unwrap().unwrap(), "pronto");
    });

    let texts: Vec<String> = session
        .transcript()
        .into_iter()
        .map(|message| message.text)
        .collect();
    assert_eq!(texts, ["primeira", "pronto"]);
}

fn session_requests(session: &MentorSession<ScriptedTransport>) -> Vec<MentorRequest> {
    session.transport().seen.lock().unwrap().clone()
}
