use std::{fmt::Display, time::Duration};

use gcau_config::PatchObject;
use spg_protocol::{
    FrameError, ParsedFrame, VERB_WRITE_CONFIG,
    codec::{backdoor_challenge_reply, close_command, explicit_error, parse_frame},
};

use crate::{
    channel::{Channel, ChannelError},
    chunks::{Chunk, WriteChunks},
};

const BACKDOOR_REQUEST: &str = "@&1/BKDOOR";
const LOGIN_REQUEST: &str = "@/LOGIN/2/";

#[derive(Debug, Clone)]
pub struct Config {
    /// Time to wait for each reply line
    pub reply_timeout: Duration,
    /// Verb of configuration writes
    pub verb: String,
    pub slave_number: Option<u32>,
    pub channel: Option<u32>,
    /// Legacy controllers do not accept the `/50` login suffix
    pub legacy_login: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(2000),
            verb: VERB_WRITE_CONFIG.to_owned(),
            slave_number: None,
            channel: Some(1),
            legacy_login: false,
        }
    }
}

/// Builder to create a [Session] and modify configuration options
///
/// # Example
///
/// ```ignore
/// use gcau_client::session::Builder;
/// use std::time::Duration;
///
/// let session = Builder::new()
///     .reply_timeout(Duration::from_secs(5))
///     .slave_number(Some(3))
///     .build(channel);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the time to wait for each reply
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    /// Set the verb used for writes
    pub fn verb(mut self, verb: impl Into<String>) -> Self {
        self.config.verb = verb.into();
        self
    }

    /// Address a slave on a shared bus
    pub fn slave_number(mut self, slave_number: Option<u32>) -> Self {
        self.config.slave_number = slave_number;
        self
    }

    pub fn channel(mut self, channel: Option<u32>) -> Self {
        self.config.channel = channel;
        self
    }

    pub fn legacy_login(mut self, legacy: bool) -> Self {
        self.config.legacy_login = legacy;
        self
    }

    /// Build and return the session
    pub fn build<C: Channel>(self, channel: C) -> Session<C> {
        Session::new(channel, self.config)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    /// Challenge requested, reply not yet accepted
    Login,
    Authenticated,
    /// Writing chunk `chunk` (1-based) of `of` chunks of the current object
    Writing { chunk: usize, of: usize },
    Done,
    Failed(FrameError),
}

/// The object and chunk a patch write stopped at
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteFailure {
    pub object: String,
    /// 1-based
    pub chunk: usize,
    pub error: FrameError,
}

impl Display for WriteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Writing {} failed at chunk {}: {:?}",
            self.object, self.chunk, self.error
        )
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteReport {
    /// Number of objects written completely
    pub written: usize,
    pub failure: Option<WriteFailure>,
}

impl WriteReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A logical connection to one controller.
///
/// Requests are strictly serial: every request awaits its reply or the reply timeout
/// before the next one is sent.
#[derive(Debug)]
pub struct Session<C: Channel> {
    channel: C,
    config: Config,
    state: SessionState,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C, config: Config) -> Session<C> {
        Session {
            channel,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    async fn request_reply(&mut self, request: &str) -> Result<String, ChannelError> {
        log::debug!("Request {:?}", request);
        self.channel.send(request).await?;
        let reply = self.channel.receive_line(self.config.reply_timeout).await?;
        log::debug!("Reply {:?}", reply);
        Ok(reply)
    }

    /// Sends `full_request` verbatim and parses the reply with checksum verification.
    pub async fn request(&mut self, full_request: &str) -> ParsedFrame {
        match self.request_reply(full_request).await {
            Ok(reply) => parse_frame(&reply, true),
            Err(err) => {
                log::debug!("Request failed: {}", err);
                ParsedFrame::failed(err.frame_error())
            }
        }
    }

    /// Performs the backdoor login. Returns whether the controller accepted it.
    pub async fn login(&mut self) -> bool {
        self.state = SessionState::Login;
        match self.try_login().await {
            Ok(()) => {
                log::info!("Logged in");
                self.state = SessionState::Authenticated;
                true
            }
            Err(error) => {
                log::error!("Login failed: {:?}", error);
                self.state = SessionState::Failed(error);
                false
            }
        }
    }

    async fn try_login(&mut self) -> Result<(), FrameError> {
        let challenge = self.request(&close_command(BACKDOOR_REQUEST)).await;
        if !challenge.is_valid() {
            return Err(challenge.error());
        }
        let response = match challenge.fields() {
            [verb, challenge] if verb == "BKDOOR" => backdoor_challenge_reply(challenge),
            _ => None,
        }
        .ok_or(FrameError::WrongFrameFormat)?;

        let suffix = if self.config.legacy_login { "" } else { "/50" };
        let login = format!("{}{}{}", LOGIN_REQUEST, response, suffix);
        let reply = self.request(&close_command(&login)).await;
        if !reply.is_valid() {
            return Err(reply.error());
        }
        match reply.fields() {
            [verb, status] if verb == "LOGIN" && status == "OK" => Ok(()),
            _ => match explicit_error(&reply) {
                FrameError::Ok => Err(FrameError::WrongFrameFormat),
                error => Err(error),
            },
        }
    }

    /// Sends one chunk and verifies the echoed reply.
    pub async fn write_chunk(&mut self, chunks: &WriteChunks, chunk: &Chunk) -> FrameError {
        let reply = match self.request_reply(chunk.command()).await {
            Ok(reply) => reply,
            Err(err) => return err.frame_error(),
        };
        let frame = parse_frame(&reply, true);
        if !frame.is_valid() {
            return FrameError::WrongFrameFormat;
        }
        let error = explicit_error(&frame);
        if !error.is_ok() {
            return error;
        }
        chunks.check_reply(&reply, chunk)
    }

    /// Writes every chunk of `object` in order, stopping at the first failing one.
    ///
    /// The session ends up [SessionState::Done] or [SessionState::Failed].
    pub async fn write_object(&mut self, object: &PatchObject) -> FrameError {
        let (_, error) = self.write_object_chunks(object).await;
        self.state = if error.is_ok() {
            SessionState::Done
        } else {
            SessionState::Failed(error)
        };
        error
    }

    async fn write_object_chunks(&mut self, object: &PatchObject) -> (usize, FrameError) {
        let chunks = WriteChunks::new(
            object,
            &self.config.verb,
            self.config.slave_number,
            self.config.channel,
        );
        log::trace!("{}", chunks);
        for (index, chunk) in chunks.chunks().iter().enumerate() {
            self.state = SessionState::Writing {
                chunk: index + 1,
                of: chunks.len(),
            };
            let error = self.write_chunk(&chunks, chunk).await;
            if !error.is_ok() {
                return (index + 1, error);
            }
        }
        (chunks.len(), FrameError::Ok)
    }

    /// Writes `objects` in order, stopping at the first failure.
    pub async fn write_patch(&mut self, objects: &[PatchObject]) -> WriteReport {
        let mut report = WriteReport::default();
        for object in objects {
            let (chunk, error) = self.write_object_chunks(object).await;
            if !error.is_ok() {
                let failure = WriteFailure {
                    object: object.name().to_owned(),
                    chunk,
                    error,
                };
                log::error!("{}", failure);
                self.state = SessionState::Failed(error);
                report.failure = Some(failure);
                return report;
            }
            log::debug!("Wrote {}", object.name());
            report.written += 1;
        }
        log::info!("Wrote {} objects", report.written);
        self.state = SessionState::Done;
        report
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;
    use gcau_config::Attribute;

    /// Replays canned replies and records every request
    #[derive(Default)]
    struct Scripted {
        sent: Vec<String>,
        replies: VecDeque<Result<String, ChannelError>>,
    }

    impl Scripted {
        fn replying(replies: &[&str]) -> Scripted {
            Scripted {
                sent: Vec::new(),
                replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
            }
        }
    }

    impl Channel for Scripted {
        async fn send(&mut self, data: &str) -> Result<(), ChannelError> {
            self.sent.push(data.to_owned());
            Ok(())
        }

        async fn receive_line(&mut self, _timeout: Duration) -> Result<String, ChannelError> {
            self.replies.pop_front().unwrap_or(Err(ChannelError::Timeout))
        }
    }

    fn reply(body: &str) -> String {
        close_command(body).trim_end().to_owned()
    }

    fn object(name: &str, values: &[&str]) -> PatchObject {
        let attributes = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let position = i as u16 + 1;
                Attribute::new(format!("A{}", position), position, Some(v.to_string()), false)
            })
            .collect();
        PatchObject::new(name, attributes, values.len() as u16)
    }

    #[tokio::test]
    async fn login_answers_challenge() {
        let replies = [reply("/BKDOOR/123/"), reply("/LOGIN/OK/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new().build(Scripted::replying(&replies));
        assert!(session.login().await);
        assert_eq!(session.state(), &SessionState::Authenticated);

        let sent = &session.channel_mut().sent;
        assert_eq!(sent[0], close_command("@&1/BKDOOR"));
        // z = (2+3+2)%10, y = (7+2+5)%10, x = (1+4+7)%10
        assert_eq!(sent[1], close_command("@/LOGIN/2/247/50"));
    }

    #[tokio::test]
    async fn legacy_login_omits_suffix() {
        let replies = [reply("/BKDOOR/000/"), reply("/LOGIN/OK/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new()
            .legacy_login(true)
            .build(Scripted::replying(&replies));
        assert!(session.login().await);
        assert_eq!(session.into_inner().sent[1], close_command("@/LOGIN/2/472"));
    }

    #[tokio::test]
    async fn login_fails_on_bad_replies() {
        let cases = [
            vec![reply("/BKDOOR/12a/")],
            vec![reply("/BKDOOR/123/4/")],
            vec!["/BKDOOR/123/\u{16}00".to_owned()],
            vec![reply("/BKDOOR/123/"), reply("/LOGIN/KO/")],
            vec![reply("/BKDOOR/123/"), reply("/#ERROR/AL/")],
            vec![],
        ];
        for case in cases {
            let replies: Vec<&str> = case.iter().map(String::as_str).collect();
            let mut session = Builder::new().build(Scripted::replying(&replies));
            assert!(!session.login().await, "{:?}", case);
            assert!(matches!(session.state(), SessionState::Failed(_)));
        }
    }

    #[tokio::test]
    async fn login_failure_keeps_reason() {
        let replies = [reply("/BKDOOR/123/"), reply("/#ERROR/AL/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new().build(Scripted::replying(&replies));
        assert!(!session.login().await);
        assert_eq!(
            session.state(),
            &SessionState::Failed(FrameError::RepliedAccessLevelTooLow)
        );

        let mut session = Builder::new().build(Scripted::default());
        assert!(!session.login().await);
        assert_eq!(session.state(), &SessionState::Failed(FrameError::Timeout));
    }

    #[tokio::test]
    async fn request_maps_transport_errors() {
        let mut channel = Scripted::default();
        channel.replies.push_back(Err(ChannelError::Closed));
        let mut session = Session::new(channel, Config::default());
        assert_eq!(
            session.request("@&1/RCFG/REGISTRY\r").await.error(),
            FrameError::UndefinedError
        );
        assert_eq!(
            session.request("@&1/RCFG/REGISTRY\r").await.error(),
            FrameError::Timeout
        );
        assert_eq!(session.into_inner().sent.len(), 2);
    }

    #[tokio::test]
    async fn writes_and_verifies_objects() {
        let replies = [reply("/WCFG/ANIX_1/10/20/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new().build(Scripted::replying(&replies));
        let error = session.write_object(&object("ANIX_1", &["10", "20"])).await;
        assert_eq!(error, FrameError::Ok);
        assert_eq!(session.state(), &SessionState::Done);
        assert_eq!(
            session.into_inner().sent,
            vec![close_command("@&1/WCFG/ANIX_1/1:10/2:20")]
        );
    }

    #[tokio::test]
    async fn rejected_write_fails_session() {
        let replies = [reply("/#ERROR/UO/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new().build(Scripted::replying(&replies));
        let error = session.write_object(&object("ANIX_1", &["10"])).await;
        assert_eq!(error, FrameError::RepliedUnknownObject);
        assert_eq!(
            session.state(),
            &SessionState::Failed(FrameError::RepliedUnknownObject)
        );
    }

    #[tokio::test]
    async fn write_chunk_maps_replies() {
        let object = object("ANIX_1", &["10"]);
        let cases = [
            (reply("/#ERROR/BV/"), FrameError::RepliedBadAttributeValue),
            (reply("/#ERROR/XX/"), FrameError::UndefinedError),
            ("/WCFG/ANIX_1/10/\u{16}00".to_owned(), FrameError::WrongFrameFormat),
            ("garbage".to_owned(), FrameError::WrongFrameFormat),
            (reply("/RCFG/ANIX_1/10/"), FrameError::WrongVerbInReply),
            (reply("/WCFG/ANIX_1/11/"), FrameError::ReplyFieldDoesNotMatchRequestField),
        ];
        for (answer, expected) in cases {
            let mut session = Builder::new().build(Scripted::replying(&[answer.as_str()]));
            let chunks = WriteChunks::new(&object, "WCFG", None, Some(1));
            let error = session.write_chunk(&chunks, &chunks.chunks()[0]).await;
            assert_eq!(error, expected, "{:?}", answer);
        }
    }

    #[tokio::test]
    async fn write_patch_stops_at_first_failure() {
        let replies = [
            reply("/WCFG/ANIX_1/1/"),
            reply("/#ERROR/UO/"),
            reply("/WCFG/ANIX_3/3/"),
        ];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new()
            .channel(None)
            .build(Scripted::replying(&replies));
        let objects = [
            object("ANIX_1", &["1"]),
            object("ANIX_2", &["2"]),
            object("ANIX_3", &["3"]),
        ];
        let report = session.write_patch(&objects).await;
        assert_eq!(report.written, 1);
        assert_eq!(
            report.failure,
            Some(WriteFailure {
                object: "ANIX_2".to_owned(),
                chunk: 1,
                error: FrameError::RepliedUnknownObject,
            })
        );
        assert!(!report.is_success());
        assert_eq!(
            session.state(),
            &SessionState::Failed(FrameError::RepliedUnknownObject)
        );
        assert_eq!(session.into_inner().sent.len(), 2);
    }

    #[tokio::test]
    async fn write_patch_reports_success() {
        let replies = [reply("/WCFG/ANIX_1/1/"), reply("/WCFG/ANIX_2/2/")];
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut session = Builder::new().build(Scripted::replying(&replies));
        let objects = [object("ANIX_1", &["1"]), object("ANIX_2", &["2"])];
        let report = session.write_patch(&objects).await;
        assert!(report.is_success());
        assert_eq!(report.written, 2);
        assert_eq!(session.state(), &SessionState::Done);
    }
}
