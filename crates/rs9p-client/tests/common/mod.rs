//! An in-memory 9P server driven step by step by the test.

#![allow(dead_code)]

use {
    futures::StreamExt,
    rs9p_client::{Dialect, FCall, Message, MsgType, Session, SessionConfig},
    std::sync::Arc,
    tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    tokio_util::codec::{FramedRead, LengthDelimitedCodec},
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The server end of a connection.
pub struct Server {
    reader: FramedRead<ReadHalf<DuplexStream>, LengthDelimitedCodec>,
    writer: Option<WriteHalf<DuplexStream>>,
    pub dialect: Dialect,
}

/// A session and the server it talks to, before version negotiation.
pub fn pair(config: SessionConfig) -> (Session, Server) {
    pair_with_capacity(config, 1 << 20)
}

/// Like [`pair`], with `capacity` bytes of buffering in each direction.
pub fn pair_with_capacity(config: SessionConfig, capacity: usize) -> (Session, Server) {
    init_logger();

    let (client, server) = tokio::io::duplex(capacity);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, server_write) = tokio::io::split(server);

    let reader = LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(0)
        .num_skip(0)
        .little_endian()
        .new_read(server_read);

    let server = Server {
        reader,
        writer: Some(server_write),
        dialect: Dialect::Baseline,
    };
    (Session::new(client_read, client_write, config), server)
}

/// A negotiated session speaking `version`.
pub async fn connected(version: &str, msize: u32) -> (Arc<Session>, Server) {
    connected_with_capacity(version, msize, 1 << 20).await
}

pub async fn connected_with_capacity(
    version: &str,
    msize: u32,
    capacity: usize,
) -> (Arc<Session>, Server) {
    let (mut session, mut server) =
        pair_with_capacity(SessionConfig::default().msize(msize), capacity);

    let (negotiated, _) = tokio::join!(session.negotiate(), server.accept_version(msize, version));
    negotiated.unwrap();

    (Arc::new(session), server)
}

impl Server {
    /// Receive the next request.
    pub async fn recv(&mut self) -> (u16, FCall) {
        let frame = self
            .reader
            .next()
            .await
            .expect("client closed the stream")
            .expect("bad frame");
        let msg = Message::received(frame.freeze()).expect("bad message");
        let tag = msg.tag();
        (tag, msg.into_fcall(self.dialect).expect("undecodable request"))
    }

    /// Send `fcall` under `tag`.
    pub async fn reply(&mut self, tag: u16, fcall: FCall) {
        let mut msg = Message::from_fcall(&fcall, self.dialect).unwrap();
        msg.set_tag(tag).unwrap();
        self.send_raw(msg.build().unwrap().bytes().unwrap()).await;
    }

    /// Write arbitrary bytes to the client.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let writer = self.writer.as_mut().expect("server writer closed");
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Hang up the write side; the client sees end of stream.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.unwrap();
        }
    }

    /// Answer the version request and switch to the agreed dialect.
    pub async fn accept_version(&mut self, msize: u32, version: &str) {
        let (tag, request) = self.recv().await;
        match request {
            FCall::TVersion { .. } => {}
            other => panic!("expected TVersion, got {:?}", other),
        }
        self.reply(
            tag,
            FCall::RVersion {
                msize,
                version: version.to_owned(),
            },
        )
        .await;
        self.dialect = Dialect::from_version(version);
    }

    /// Receive a request and answer it with `reply`.
    pub async fn expect(&mut self, expected: MsgType, reply: FCall) -> FCall {
        let (tag, request) = self.recv().await;
        assert_eq!(MsgType::from(&request), expected, "request {:?}", request);
        self.reply(tag, reply).await;
        request
    }
}
