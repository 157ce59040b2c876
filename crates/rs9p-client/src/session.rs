//! Session transport: one 9P connection shared by any number of callers.
//!
//! There is no background task reading replies. Every caller waiting for a reply
//! either gets served by whichever caller currently holds the reader role, or
//! claims the role itself and reads frames off the stream, handing each one to
//! the caller registered under its tag, until its own reply shows up.
//!
//! # Protocol
//! 9P2000/9P2000.u/9P2000.L

use {
    crate::{
        error::{Error, errno::*},
        fcall::*,
        io_err,
        message::Message,
        res,
        utils::{self, Result},
    },
    futures::sink::SinkExt,
    log::{debug, error, info, warn},
    std::{
        collections::{HashMap, HashSet},
        fmt,
        sync::{
            Mutex, MutexGuard, PoisonError,
            atomic::{AtomicBool, Ordering},
        },
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::{TcpStream, UnixStream},
        sync::{self, Notify, oneshot},
    },
    tokio_stream::StreamExt,
    tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
};

/// Message size proposed when the caller does not pick one
pub const DEFAULT_MSIZE: u32 = 8192;

/// Bytes of the size field leading every frame
const SIZE_FIELD: usize = 4;

/// Smallest negotiated message size the client can work with
pub const MIN_MSIZE: u32 = 256;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Parameters supplied by whoever mounts the remote tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum message size proposed in `TVersion`
    pub msize: u32,
    /// User name sent in `TAttach`
    pub uname: String,
    /// Remote tree to attach to
    pub aname: String,
    /// Numeric user id sent in `TAttach` (9P2000.u/9P2000.L only)
    pub n_uname: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            msize: DEFAULT_MSIZE,
            uname: "nobody".to_owned(),
            aname: "/".to_owned(),
            n_uname: NONUNAME,
        }
    }
}

impl SessionConfig {
    pub fn msize(mut self, msize: u32) -> Self {
        self.msize = msize;
        self
    }

    pub fn uname(mut self, uname: impl Into<String>) -> Self {
        self.uname = uname.into();
        self
    }

    pub fn aname(mut self, aname: impl Into<String>) -> Self {
        self.aname = aname.into();
        self
    }

    pub fn n_uname(mut self, n_uname: u32) -> Self {
        self.n_uname = n_uname;
        self
    }
}

/// Everything guarded by the session lock.
struct State {
    next_tag: u16,
    next_fid: u32,
    /// Callers waiting for a reply, by tag
    pending: HashMap<u16, oneshot::Sender<Result<Message>>>,
    /// Tags whose replies are expected but nobody waits for
    ignored: HashSet<u16>,
}

impl State {
    fn new() -> State {
        State {
            next_tag: 0,
            next_fid: 1,
            pending: HashMap::new(),
            ignored: HashSet::new(),
        }
    }

    fn tag_in_use(&self, tag: u16) -> bool {
        tag == NOTAG || self.pending.contains_key(&tag) || self.ignored.contains(&tag)
    }

    fn allocate_tag(&mut self) -> Result<u16> {
        for _ in 0..=u16::MAX {
            let tag = self.next_tag;
            self.next_tag = self.next_tag.wrapping_add(1);
            if !self.tag_in_use(tag) {
                return Ok(tag);
            }
        }

        error!("All 9P tags are in use");
        Err(Error::No(EAGAIN))
    }

    // Fids are never reused while the session lives.
    fn allocate_fid(&mut self) -> Result<u32> {
        if self.next_fid == NOFID {
            error!("9P fid space exhausted");
            return Err(Error::No(EMFILE));
        }

        let fid = self.next_fid;
        self.next_fid += 1;
        Ok(fid)
    }

    /// Resolve every waiter with `err` and forget all outstanding tags.
    fn fail_all(&mut self, err: &Error) -> usize {
        let count = self.pending.len();
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(err.clone()));
        }
        self.ignored.clear();
        count
    }
}

/// A connected 9P endpoint.
pub struct Session {
    config: SessionConfig,
    msize: u32,
    dialect: Dialect,
    state: Mutex<State>,
    active_reader: AtomicBool,
    reader_released: Notify,
    reader: sync::Mutex<FramedRead<BoxedReader, LengthDelimitedCodec>>,
    writer: sync::Mutex<FramedWrite<BoxedWriter, LengthDelimitedCodec>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("msize", &self.msize)
            .field("dialect", &self.dialect)
            .field("active_reader", &self.active_reader)
            .finish_non_exhaustive()
    }
}

/// Completion slot of one outstanding request.
///
/// The sender half lives in `State::pending` while the tag is outstanding.
/// Dropping the slot withdraws the registration unless a reply already landed.
struct Completion<'a> {
    session: &'a Session,
    tag: u16,
    rx: oneshot::Receiver<Result<Message>>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        // Replies are sent with the state lock held, so under the lock an empty
        // channel means the sender is still registered.
        let mut state = self.session.state();
        if let Err(oneshot::error::TryRecvError::Empty) = self.rx.try_recv() {
            debug!("Abandoning wait for tag {}", self.tag);
            state.pending.remove(&self.tag);
        }
    }
}

/// A tag recorded in `State::ignored`; withdrawn on drop unless the post went through.
struct IgnoredTag<'a> {
    session: &'a Session,
    tag: u16,
    posted: bool,
}

impl Drop for IgnoredTag<'_> {
    fn drop(&mut self) {
        if !self.posted {
            self.session.state().ignored.remove(&self.tag);
        }
    }
}

/// Held by the one caller currently reading frames off the stream.
struct ReaderRole<'a> {
    session: &'a Session,
}

impl Drop for ReaderRole<'_> {
    fn drop(&mut self) {
        self.session.active_reader.store(false, Ordering::Release);
        self.session.reader_released.notify_waiters();
    }
}

impl Session {
    /// Wrap a byte stream. The session is usable once [`Session::negotiate`] succeeded.
    pub fn new<R, W>(reader: R, writer: W, config: SessionConfig) -> Session
    where
        R: 'static + AsyncRead + Send + Unpin,
        W: 'static + AsyncWrite + Send + Unpin,
    {
        // Frames are handed out whole, size field included.
        let framedread = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(0)
            .num_skip(0)
            .max_frame_length(config.msize as usize)
            .little_endian()
            .new_read(Box::new(reader) as BoxedReader);
        let framedwrite = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(-4)
            .little_endian()
            .new_write(Box::new(writer) as BoxedWriter);

        Session {
            msize: config.msize,
            dialect: Dialect::Baseline,
            config,
            state: Mutex::new(State::new()),
            active_reader: AtomicBool::new(false),
            reader_released: Notify::new(),
            reader: sync::Mutex::new(framedread),
            writer: sync::Mutex::new(framedwrite),
        }
    }

    /// Dial `proto!address!port` (`tcp` or `unix`) and negotiate the protocol version.
    pub async fn connect(addr: &str, config: SessionConfig) -> Result<Session> {
        let (proto, host, port) = utils::parse_proto(addr)
            .ok_or_else(|| io_err!(InvalidInput, "Invalid protocol or address"))?;

        let mut session = match proto {
            "tcp" => {
                let stream = TcpStream::connect(format!("{}:{}", host, port)).await?;
                stream.set_nodelay(true)?;
                info!("connected: {:?}", stream.peer_addr()?);
                let (readhalf, writehalf) = stream.into_split();
                Session::new(readhalf, writehalf, config)
            }
            "unix" => {
                let stream = UnixStream::connect(host).await?;
                info!("connected: {}", host);
                let (readhalf, writehalf) = stream.into_split();
                Session::new(readhalf, writehalf, config)
            }
            _ => return res!(io_err!(InvalidInput, "Protocol not supported")),
        };

        session.negotiate().await?;
        Ok(session)
    }

    /// Exchange `TVersion`/`RVersion`.
    ///
    /// The session keeps the smaller of the two message sizes and the closest
    /// dialect to the version string the server answered with.
    pub async fn negotiate(&mut self) -> Result<()> {
        let request = FCall::TVersion {
            msize: self.config.msize,
            version: P92000L.to_owned(),
        };

        let (msize, version) = match self.rpc(request).await? {
            FCall::RVersion { msize, version } => (msize, version),
            _ => return Err(Error::No(EPROTO)),
        };

        let msize = msize.min(self.config.msize);
        if msize < MIN_MSIZE {
            error!("Server offered an unusable msize of {}", msize);
            return Err(Error::No(EPROTO));
        }

        let dialect = Dialect::from_version(&version);
        if dialect == Dialect::Baseline && version != P92000 {
            warn!(
                "Server answered with version {:?}, falling back to {}",
                version, P92000
            );
        }

        self.msize = msize;
        self.dialect = dialect;
        self.reader
            .get_mut()
            .decoder_mut()
            .set_max_frame_length(msize as usize);

        info!("negotiated {} with msize {}", dialect.version(), msize);
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Negotiated maximum message size
    pub fn msize(&self) -> u32 {
        self.msize
    }

    /// Negotiated protocol dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Number of callers waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Number of replies expected to be dropped on arrival
    pub fn ignored_count(&self) -> usize {
        self.state().ignored.len()
    }

    /// Whether some caller is reading frames off the stream right now
    pub fn has_active_reader(&self) -> bool {
        self.active_reader.load(Ordering::Acquire)
    }

    /// Allocate a fid which is never handed out again by this session.
    pub fn allocate_fid(&self) -> Result<u32> {
        self.state().allocate_fid()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a message to the stream without waiting for anything in return.
    ///
    /// Unbuilt messages are built first; the tag they carry is used as is.
    pub async fn post(&self, message: Message) -> Result<()> {
        let message = if message.is_built() {
            message
        } else {
            message.build()?
        };

        let frame = message.bytes().ok_or(Error::No(EINVAL))?;
        if frame.len() > self.msize as usize {
            error!(
                "{:?} of {} bytes exceeds msize {}",
                message.msg_type(),
                frame.len(),
                self.msize
            );
            return Err(Error::No(EMSGSIZE));
        }

        debug!(
            "\t→ {:?} tag {} ({} bytes)",
            message.msg_type(),
            message.tag(),
            frame.len()
        );

        // The codec writes the size field again. A frame is queued whole, so a
        // flush cut short leaves the rest buffered for the next writer.
        let mut framedwrite = self.writer.lock().await;
        framedwrite.feed(frame.slice(SIZE_FIELD..)).await?;
        SinkExt::<bytes::Bytes>::flush(&mut *framedwrite).await?;
        Ok(())
    }

    /// Post a message under a fresh tag whose reply will be dropped on arrival.
    pub async fn post_and_ignore_reply(&self, mut message: Message) -> Result<()> {
        let mut ignored = {
            let mut state = self.state();
            let tag = state.allocate_tag()?;
            message.set_tag(tag)?;
            state.ignored.insert(tag);
            IgnoredTag {
                session: self,
                tag,
                posted: false,
            }
        };

        self.post(message).await?;
        ignored.posted = true;
        Ok(())
    }

    /// Post a message and wait for the reply carrying the same tag.
    ///
    /// With `validate_reply`, error replies are turned into errors and any reply
    /// that does not answer the request's type is a protocol error.
    pub async fn post_and_wait(&self, mut message: Message, validate_reply: bool) -> Result<Message> {
        let request_type = message.msg_type();
        let mut completion = self.register(&mut message)?;

        self.post(message).await?;

        let mut reply = self.wait_for_reply(&mut completion).await?;
        if validate_reply {
            self.check_reply(request_type, &mut reply)?;
        }
        Ok(reply)
    }

    /// Send a typed request and decode its validated reply.
    pub async fn rpc(&self, fcall: FCall) -> Result<FCall> {
        self.call(&fcall, true).await
    }

    /// Send a typed request and decode whatever comes back.
    pub async fn call(&self, fcall: &FCall, validate_reply: bool) -> Result<FCall> {
        info!("\t→ {:?}", fcall);
        let message = Message::from_fcall(fcall, self.dialect)?;
        let reply = self
            .post_and_wait(message, validate_reply)
            .await?
            .into_fcall(self.dialect)?;
        info!("\t← {:?}", reply);
        Ok(reply)
    }

    /// Send a typed request whose reply nobody waits for.
    pub async fn rpc_ignore_reply(&self, fcall: FCall) -> Result<()> {
        info!("\t→ {:?} (reply ignored)", fcall);
        self.post_and_ignore_reply(Message::from_fcall(&fcall, self.dialect)?)
            .await
    }

    /// Fail every outstanding request and close the write side of the stream.
    pub async fn shutdown(&self) -> Result<()> {
        let failed = self.state().fail_all(&Error::No(ECONNABORTED));
        if failed > 0 {
            warn!("Shutting down with {} requests outstanding", failed);
        }

        SinkExt::<bytes::Bytes>::close(&mut *self.writer.lock().await).await?;
        Ok(())
    }

    fn register(&self, message: &mut Message) -> Result<Completion<'_>> {
        let mut state = self.state();

        let tag = if message.msg_type() == MsgType::TVersion {
            if state.pending.contains_key(&NOTAG) {
                return Err(Error::No(EBUSY));
            }
            NOTAG
        } else {
            state.allocate_tag()?
        };
        message.set_tag(tag)?;

        let (tx, rx) = oneshot::channel();
        state.pending.insert(tag, tx);

        Ok(Completion {
            session: self,
            tag,
            rx,
        })
    }

    async fn wait_for_reply(&self, completion: &mut Completion<'_>) -> Result<Message> {
        loop {
            // Armed before trying to claim the role so that a release in between is not lost.
            let released = self.reader_released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self
                .active_reader
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _role = ReaderRole { session: self };
                return self.read_until_complete(completion).await;
            }

            tokio::select! {
                biased;
                reply = &mut completion.rx => {
                    return reply.unwrap_or(Err(Error::No(ECONNABORTED)));
                }
                _ = &mut released => {}
            }
        }
    }

    async fn read_until_complete(&self, completion: &mut Completion<'_>) -> Result<Message> {
        let mut framedread = self.reader.lock().await;

        loop {
            // The reply may also come from a shutdown while the stream is idle.
            let frame = tokio::select! {
                biased;
                reply = &mut completion.rx => {
                    return reply.unwrap_or(Err(Error::No(ECONNABORTED)));
                }
                frame = framedread.next() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame.freeze(),
                Some(Err(e)) => return Err(self.fail_pending(e.into())),
                None => {
                    return Err(self.fail_pending(From::from(io_err!(
                        UnexpectedEof,
                        "9P connection closed"
                    ))));
                }
            };

            match Message::received(frame) {
                Ok(msg) => self.dispatch(msg),
                Err(e) => return Err(self.fail_pending(e)),
            }
        }
    }

    /// Hand a received frame to whoever waits for its tag.
    fn dispatch(&self, msg: Message) {
        let tag = msg.tag();
        let mut state = self.state();

        if let Some(tx) = state.pending.remove(&tag) {
            debug!("\t← {:?} tag {}", msg.msg_type(), tag);
            // A closed receiver means the caller stopped waiting.
            let _ = tx.send(Ok(msg));
        } else if state.ignored.remove(&tag) {
            debug!("\t← {:?} tag {} (ignored)", msg.msg_type(), tag);
        } else {
            warn!(
                "Dropping unexpected {:?} with tag {}",
                msg.msg_type(),
                tag
            );
        }
    }

    fn fail_pending(&self, err: Error) -> Error {
        let failed = self.state().fail_all(&err);
        error!(
            "9P transport failed with {} requests outstanding: {}",
            failed, err
        );
        err
    }

    fn check_reply(&self, request: MsgType, reply: &mut Message) -> Result<()> {
        match reply.msg_type() {
            MsgType::RlError => {
                let ecode: u32 = reply.read()?;
                Err(Error::No(Errno::from_raw(ecode as i32)))
            }
            MsgType::RError => {
                let ename: String = reply.read()?;
                let errno: u32 = match self.dialect {
                    Dialect::DotU => reply.read()?,
                    Dialect::Baseline | Dialect::DotL => 0,
                };
                if errno != 0 {
                    Err(Error::No(Errno::from_raw(errno as i32)))
                } else {
                    warn!("{:?}: server error: {}", request, ename);
                    Err(Error::No(EIO))
                }
            }
            typ if Some(typ) == request.reply() => Ok(()),
            typ => {
                error!("{:?} was answered with {:?}", request, typ);
                Err(Error::No(EIO))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let failed = self.state().fail_all(&Error::No(ECONNABORTED));
        if failed > 0 {
            warn!("Session dropped with {} requests outstanding", failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_skip_notag_and_busy_tags() {
        let mut state = State::new();
        state.next_tag = NOTAG - 1;
        let (tx, _rx) = oneshot::channel();
        state.pending.insert(0, tx);
        state.ignored.insert(1);

        assert_eq!(state.allocate_tag().unwrap(), NOTAG - 1);
        // NOTAG, 0 and 1 are all taken
        assert_eq!(state.allocate_tag().unwrap(), 2);
    }

    #[test]
    fn tags_exhausted() {
        let mut state = State::new();
        for tag in 0..NOTAG {
            state.ignored.insert(tag);
        }
        match state.allocate_tag() {
            Err(Error::No(e)) => assert_eq!(e, EAGAIN),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn fids_are_monotonic_and_finite() {
        let mut state = State::new();
        assert_eq!(state.allocate_fid().unwrap(), 1);
        assert_eq!(state.allocate_fid().unwrap(), 2);

        state.next_fid = NOFID - 1;
        assert_eq!(state.allocate_fid().unwrap(), NOFID - 1);
        assert!(state.allocate_fid().is_err());
        assert!(state.allocate_fid().is_err());
    }

    #[test]
    fn fail_all_drains_everything() {
        let mut state = State::new();
        let (tx, mut rx) = oneshot::channel();
        state.pending.insert(9, tx);
        state.ignored.insert(10);

        assert_eq!(state.fail_all(&Error::No(EPIPE)), 1);
        assert!(state.pending.is_empty());
        assert!(state.ignored.is_empty());
        match rx.try_recv() {
            Ok(Err(e)) => assert_eq!(e.errno(), EPIPE),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn config_builder() {
        let config = SessionConfig::default()
            .msize(65536)
            .uname("glenda")
            .aname("/usr/glenda")
            .n_uname(1000);
        assert_eq!(config.msize, 65536);
        assert_eq!(config.uname, "glenda");
        assert_eq!(config.aname, "/usr/glenda");
        assert_eq!(config.n_uname, 1000);
        assert_eq!(SessionConfig::default().n_uname, NONUNAME);
    }
}
