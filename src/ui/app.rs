use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::bot::SimulatedParticipants;
use crate::common::{MessageDraft, RoomEvent, UserCommand};
use crate::error::ChatResult;
use crate::identity::IdentityStore;
use crate::retry::{RetryPolicy, with_retry};
use crate::room::{RoomChannel, Subscription};
use crate::summarizer::{SummaryOutcome, Summarizer};

use super::state::{AppState, render_message};

const HELP: &str = "\
Commands:
  <text>            send a message
  /retry            resend the last message that failed
  /bot              start or stop the simulated participants
  /summarize        post an AI summary of the conversation
  /clear            delete every message in the room
  /quit             leave";

enum Flow {
    Continue,
    Quit,
}

/// Line-oriented chat front end. Room snapshots and send failures arrive
/// over an mpsc channel; input lines arrive from `run`'s reader. Outgoing
/// messages go through the outbox task, so retry backoff never blocks input.
pub struct ChatApp {
    state: AppState,
    identity: IdentityStore,
    room: RoomChannel,
    bot: SimulatedParticipants,
    summarizer: Arc<Summarizer>,
    outbox: mpsc::UnboundedSender<MessageDraft>,
    event_receiver: mpsc::UnboundedReceiver<RoomEvent>,
    subscription: Subscription,
}

impl ChatApp {
    pub fn new(
        identity: IdentityStore,
        room: RoomChannel,
        bot: SimulatedParticipants,
        summarizer: Arc<Summarizer>,
        send_policy: RetryPolicy,
    ) -> Self {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let error_sender = event_sender.clone();
        let (outbox, drafts) = mpsc::unbounded_channel();
        tokio::spawn(run_outbox(room.clone(), send_policy, drafts, event_sender.clone()));

        let subscription = room.subscribe(
            move |snapshot| {
                if event_sender.send(RoomEvent::Snapshot(snapshot)).is_err() {
                    log::debug!("Chat front end gone; dropping snapshot");
                }
            },
            move |err| {
                let _ = error_sender.send(RoomEvent::SubscriptionError(err.to_string()));
            },
        );

        Self {
            state: AppState::new(),
            identity,
            room,
            bot,
            summarizer,
            outbox,
            event_receiver,
            subscription,
        }
    }

    pub async fn run<R, W>(mut self, input: R, mut out: W) -> ChatResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let identity = self.identity.identity();
        say(
            &mut out,
            &format!(
                "Signed in as {} ({}). Type /help for commands.",
                identity.display_name, identity.avatar_color
            ),
        )
        .await?;

        let mut lines = input.lines();
        loop {
            tokio::select! {
                event = self.event_receiver.recv() => match event {
                    Some(event) => self.handle_room_event(event, &mut out).await?,
                    None => break,
                },
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Flow::Quit = self.handle_line(&line, &mut out).await? {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        self.bot.stop();
        self.subscription.cancel();
        log::info!("Chat session closed");
    }

    async fn handle_room_event<W: AsyncWrite + Unpin>(
        &mut self,
        event: RoomEvent,
        out: &mut W,
    ) -> ChatResult<()> {
        match event {
            RoomEvent::Snapshot(snapshot) => {
                let diff = self.state.apply_snapshot(snapshot);
                if diff.removed > 0 && self.state.messages.is_empty() {
                    say(out, "-- room cleared --").await?;
                }
                let own_id = self.identity.participant_id();
                for message in &diff.added {
                    say(out, &render_message(message, own_id)).await?;
                }
            }
            RoomEvent::SubscriptionError(err) => {
                say(out, &format!("(live updates interrupted: {err})")).await?;
            }
            RoomEvent::SendFailed { text, error } => {
                self.state.input_text = text;
                say(out, &format!("Message not sent ({error}); type /retry to resend")).await?;
            }
        }
        Ok(())
    }

    async fn handle_line<W: AsyncWrite + Unpin>(&mut self, line: &str, out: &mut W) -> ChatResult<Flow> {
        if self.state.confirming_clear {
            self.state.confirming_clear = false;
            let answer = line.trim().to_ascii_lowercase();
            if answer == "y" || answer == "yes" {
                match self.room.clear_all().await {
                    Ok(count) => say(out, &format!("Cleared {count} messages")).await?,
                    Err(err) => {
                        log::error!("Clear failed: {err}");
                        say(out, &format!("Clear failed: {err}")).await?;
                    }
                }
            } else {
                say(out, "Clear cancelled").await?;
            }
            return Ok(Flow::Continue);
        }

        let Some(command) = UserCommand::parse(line) else {
            return Ok(Flow::Continue);
        };

        match command {
            UserCommand::SendMessage(text) => self.send_message(text, out).await?,
            UserCommand::Resend => {
                if self.state.input_text.is_empty() {
                    say(out, "Nothing to resend").await?;
                } else {
                    let text = std::mem::take(&mut self.state.input_text);
                    self.send_message(text, out).await?;
                }
            }
            UserCommand::ToggleBot => {
                let line = if self.bot.toggle() { "Bot started 🤖" } else { "Bot stopped 🤖" };
                say(out, line).await?;
            }
            UserCommand::Summarize => self.request_summary(out).await?,
            UserCommand::Clear => {
                self.state.confirming_clear = true;
                say(out, "Clear all messages? [y/N]").await?;
            }
            UserCommand::Help => say(out, HELP).await?,
            UserCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Queue the text on the outbox. A failure comes back later as
    /// `RoomEvent::SendFailed`.
    async fn send_message<W: AsyncWrite + Unpin>(&mut self, text: String, out: &mut W) -> ChatResult<()> {
        let identity = self.identity.identity();
        if identity.participant_id.is_empty() {
            self.state.input_text = text;
            say(out, "Not signed in yet; type /retry once connected").await?;
            return Ok(());
        }

        if let Err(mpsc::error::SendError(draft)) =
            self.outbox.send(MessageDraft::from_identity(&identity, text))
        {
            log::error!("Outbox closed; message kept for resend");
            self.state.input_text = draft.text;
            say(out, "Message not sent; type /retry to resend").await?;
        }
        Ok(())
    }

    async fn request_summary<W: AsyncWrite + Unpin>(&mut self, out: &mut W) -> ChatResult<()> {
        if self.state.messages.is_empty() {
            return say(out, "Nothing to summarize yet").await;
        }
        if !self.summarizer.is_configured() {
            return say(out, "Set GEMINI_API_KEY to enable summaries").await;
        }
        if self.summarizer.is_in_flight() {
            return say(out, "Summarizing...").await;
        }

        let summarizer = self.summarizer.clone();
        let messages = self.state.messages.clone();
        let requester = self.identity.participant_id().to_string();
        tokio::spawn(async move {
            match summarizer.summarize(&messages, &requester).await {
                SummaryOutcome::Posted(message) => log::info!("Summary posted as {}", message.id),
                SummaryOutcome::Failed => log::warn!("Summary failed; error notice posted"),
                SummaryOutcome::Skipped(reason) => log::info!("Summary skipped: {reason:?}"),
            }
        });
        say(out, "Summarizing...").await
    }
}

/// Delivers queued user messages one at a time, in the order typed, each
/// through the retry envelope.
async fn run_outbox(
    room: RoomChannel,
    policy: RetryPolicy,
    mut drafts: mpsc::UnboundedReceiver<MessageDraft>,
    events: mpsc::UnboundedSender<RoomEvent>,
) {
    while let Some(draft) = drafts.recv().await {
        let result = with_retry(policy, || room.append(&draft)).await;
        if let Err(err) = result {
            log::error!("Error adding message: {err}");
            let failed = RoomEvent::SendFailed {
                text: draft.text,
                error: err.to_string(),
            };
            if events.send(failed).is_err() {
                break;
            }
        }
    }
    log::debug!("Outbox closed");
}

async fn say<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> ChatResult<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PreferenceFile;
    use crate::room::{RoomBackend, SqliteBackend};
    use crate::summarizer::GeminiClient;
    use std::time::Duration;
    use tokio::io::BufReader;
    use tokio::time::{Instant, timeout};

    struct Harness {
        app: ChatApp,
        backend: Arc<SqliteBackend>,
        room: RoomChannel,
        _dir: tempfile::TempDir,
    }

    async fn harness(connect: bool) -> Harness {
        harness_with_policy(connect, RetryPolicy::no_retry()).await
    }

    async fn harness_with_policy(connect: bool, send_policy: RetryPolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SqliteBackend::in_memory("lobby").unwrap());
        let room = RoomChannel::new(backend.clone());
        let mut identity = IdentityStore::load(PreferenceFile::new(dir.path().join("prefs.json")));
        if connect {
            identity.assign_participant_id(room.connect().await.unwrap());
        }

        let generator = Arc::new(GeminiClient::new(None, None, None).unwrap());
        let summarizer = Arc::new(Summarizer::new(room.clone(), generator, RetryPolicy::no_retry()));
        let bot = SimulatedParticipants::new(room.clone(), Duration::from_secs(3));
        let app = ChatApp::new(identity, room.clone(), bot, summarizer, send_policy);

        Harness {
            app,
            backend,
            room,
            _dir: dir,
        }
    }

    fn output(buf: &[u8]) -> String {
        String::from_utf8_lossy(buf).to_string()
    }

    /// Feed room events into the app until `done` holds.
    async fn pump_until(h: &mut Harness, out: &mut Vec<u8>, done: impl Fn(&ChatApp) -> bool) {
        timeout(Duration::from_secs(5), async {
            while !done(&h.app) {
                let event = h.app.event_receiver.recv().await.unwrap();
                h.app.handle_room_event(event, out).await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for room events");
    }

    async fn wait_for_stored(backend: &SqliteBackend, count: usize) -> Vec<crate::common::Message> {
        timeout(Duration::from_secs(5), async {
            loop {
                let stored = backend.list_ordered().await.unwrap();
                if stored.len() == count {
                    return stored;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for stored messages")
    }

    #[tokio::test]
    async fn sent_message_comes_back_as_you() {
        let mut h = harness(true).await;
        let mut out = Vec::new();

        h.app.handle_line("hello room", &mut out).await.unwrap();
        pump_until(&mut h, &mut out, |app| !app.state.messages.is_empty()).await;

        assert_eq!(wait_for_stored(&h.backend, 1).await[0].text, "hello room");
        assert!(output(&out).contains("You ("));
        assert!(output(&out).contains("hello room"));
    }

    #[tokio::test]
    async fn failed_send_keeps_text_for_retry() {
        let mut h = harness(true).await;
        let mut out = Vec::new();

        h.room.disconnect();
        h.app.handle_line("lost words", &mut out).await.unwrap();
        pump_until(&mut h, &mut out, |app| !app.state.input_text.is_empty()).await;
        assert_eq!(h.app.state.input_text, "lost words");
        assert!(output(&out).contains("Message not sent"));

        h.room.connect().await.unwrap();
        h.app.handle_line("/retry", &mut out).await.unwrap();
        assert!(h.app.state.input_text.is_empty());

        let stored = wait_for_stored(&h.backend, 1).await;
        assert_eq!(stored[0].text, "lost words");
    }

    #[tokio::test]
    async fn quit_is_honoured_while_a_send_backs_off() {
        // 100 + 200 + 400 + 800 ms of backoff before the send gives up
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        let h = harness_with_policy(true, policy).await;
        h.room.disconnect();

        let (mut typing, input) = tokio::io::duplex(64);
        let typist = tokio::spawn(async move {
            typing.write_all(b"hello\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            typing.write_all(b"/quit\n").await.unwrap();
            // Keep the pipe open so only /quit can end the session
            typing
        });

        let started = Instant::now();
        let mut out = Vec::new();
        timeout(Duration::from_millis(500), h.app.run(BufReader::new(input), &mut out))
            .await
            .expect("session stayed blocked on the retrying send")
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        let _typing = typist.await.unwrap();
    }

    #[tokio::test]
    async fn sends_are_delivered_in_typed_order() {
        let h = harness(true).await;
        let mut app = h.app;
        let mut out = Vec::new();
        for text in ["first", "second", "third"] {
            app.handle_line(text, &mut out).await.unwrap();
        }

        let texts: Vec<_> = wait_for_stored(&h.backend, 3)
            .await
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn clear_needs_confirmation() {
        let mut h = harness(true).await;
        let mut out = Vec::new();
        h.app.handle_line("one", &mut out).await.unwrap();
        h.app.handle_line("two", &mut out).await.unwrap();
        wait_for_stored(&h.backend, 2).await;

        h.app.handle_line("/clear", &mut out).await.unwrap();
        h.app.handle_line("n", &mut out).await.unwrap();
        assert_eq!(h.backend.list_ordered().await.unwrap().len(), 2);

        h.app.handle_line("/clear", &mut out).await.unwrap();
        h.app.handle_line("y", &mut out).await.unwrap();
        assert!(h.backend.list_ordered().await.unwrap().is_empty());
        assert!(output(&out).contains("Cleared 2 messages"));
    }

    #[tokio::test]
    async fn summary_without_key_is_explained() {
        let mut h = harness(true).await;
        let mut out = Vec::new();
        h.app.handle_line("/summarize", &mut out).await.unwrap();
        assert!(output(&out).contains("Nothing to summarize yet"));

        h.app.state.apply_snapshot(vec![crate::common::Message {
            id: "1".to_string(),
            text: "hi".to_string(),
            author_id: "bob".to_string(),
            author_display_name: "Bob".to_string(),
            author_color: "#48BB78".to_string(),
            created_at: 0,
            is_summary: false,
        }]);
        h.app.handle_line("/summarize", &mut out).await.unwrap();
        assert!(output(&out).contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn identity_stays_fixed_for_the_session() {
        let mut h = harness(true).await;
        let before = h.app.identity.identity();
        let mut out = Vec::new();

        h.app.handle_line("/name Ferris", &mut out).await.unwrap();
        h.app.handle_line("/color #000000", &mut out).await.unwrap();

        assert_eq!(h.app.identity.identity(), before);
        let stored = wait_for_stored(&h.backend, 2).await;
        assert!(stored.iter().all(|m| m.author_display_name == before.display_name));
    }

    #[tokio::test]
    async fn unsigned_send_is_held_and_quit_ends() {
        let mut h = harness(false).await;
        let mut out = Vec::new();

        h.app.handle_line("early bird", &mut out).await.unwrap();
        assert!(output(&out).contains("Not signed in yet"));
        assert_eq!(h.app.state.input_text, "early bird");

        assert!(matches!(h.app.handle_line("/quit", &mut out).await.unwrap(), Flow::Quit));
    }

    #[tokio::test]
    async fn run_stops_on_quit() {
        let h = harness(true).await;
        let input: &[u8] = b"hi there\n/bot\n/bot\n/quit\n";
        let mut out = Vec::new();
        h.app.run(input, &mut out).await.unwrap();

        assert!(output(&out).contains("Bot started"));
        assert!(output(&out).contains("Bot stopped"));
        assert_eq!(wait_for_stored(&h.backend, 1).await[0].text, "hi there");
    }
}
