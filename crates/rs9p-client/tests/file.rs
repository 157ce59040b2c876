mod common;

use {
    common::Server,
    rs9p_client::{
        Data, DirEntry, DirEntryData, FCall, GetAttrMask, MsgType, OpenMode, P92000, P92000L,
        QId, QIdType, RemoteFile, Session, SetAttrMask, Stat, errno::*, lopen, p92000,
        serialize::Encodable,
    },
    std::sync::Arc,
};

fn dir_qid(path: u64) -> QId {
    QId {
        typ: QIdType::DIR,
        version: 0,
        path,
    }
}

fn file_qid(path: u64) -> QId {
    QId {
        typ: QIdType::FILE,
        version: 0,
        path,
    }
}

fn dirent(name: &str, offset: u64) -> DirEntry {
    DirEntry {
        qid: file_qid(offset + 100),
        offset,
        typ: 8,
        name: name.to_owned(),
    }
}

async fn attached(version: &str, msize: u32) -> (Arc<Session>, Server, RemoteFile) {
    let (session, mut server) = common::connected(version, msize).await;

    let (root, request) = tokio::join!(
        RemoteFile::attach(&session),
        server.expect(MsgType::TAttach, FCall::RAttach { qid: dir_qid(1) })
    );
    match request {
        FCall::TAttach {
            fid, afid, aname, ..
        } => {
            assert_eq!(fid, 1);
            assert_eq!(afid, rs9p_client::NOFID);
            assert_eq!(aname, "/");
        }
        other => panic!("unexpected request {:?}", other),
    }

    let root = root.unwrap();
    assert!(root.is_dir());
    (session, server, root)
}

/// Walk `root` to a plain file bound to fid 2.
async fn walked(server: &mut Server, root: &RemoteFile, name: &str) -> RemoteFile {
    let (file, request) = tokio::join!(
        root.walk(name),
        server.expect(
            MsgType::TWalk,
            FCall::RWalk {
                wqids: vec![file_qid(2)]
            }
        )
    );
    assert_eq!(
        request,
        FCall::TWalk {
            fid: 1,
            newfid: 2,
            wnames: vec![name.to_owned()],
        }
    );
    file.unwrap()
}

/// Check that the next request is a clunk of `fid` and answer it.
async fn expect_clunk(server: &mut Server, fid: u32) {
    let request = server.expect(MsgType::TClunk, FCall::RClunk).await;
    assert_eq!(request, FCall::TClunk { fid });
}

#[tokio::test]
async fn read_short_file_after_readlink_refusal() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let mut file = walked(&mut server, &root, "ten").await;

    let mut buf = [0u8; 64];
    let serve = async {
        server
            .expect(
                MsgType::TlOpen,
                FCall::RlOpen {
                    qid: file_qid(2),
                    iounit: 0,
                },
            )
            .await;
        server
            .expect(MsgType::TReadLink, FCall::RlError { ecode: EINVAL as u32 })
            .await;
        server
            .expect(
                MsgType::TRead,
                FCall::RRead {
                    data: Data(b"0123456789".to_vec()),
                },
            )
            .await
    };

    let (n, request) = tokio::join!(file.read(&mut buf, 0), serve);
    assert_eq!(n.unwrap(), 10);
    assert_eq!(&buf[..10], b"0123456789");
    assert_eq!(
        request,
        FCall::TRead {
            fid: 2,
            offset: 0,
            count: 64,
        }
    );

    // Past the start there is no readlink attempt
    let (n, _) = tokio::join!(
        file.read(&mut buf, 10),
        server.expect(MsgType::TRead, FCall::RRead { data: Data(Vec::new()) })
    );
    assert_eq!(n.unwrap(), 0);

    let (clunked, _) = tokio::join!(file.clunk(), expect_clunk(&mut server, 2));
    clunked.unwrap();
}

#[tokio::test]
async fn read_of_symlink_returns_target() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let mut link = walked(&mut server, &root, "motd").await;

    let mut buf = [0u8; 64];
    let serve = async {
        server
            .expect(
                MsgType::TlOpen,
                FCall::RlOpen {
                    qid: file_qid(2),
                    iounit: 0,
                },
            )
            .await;
        server
            .expect(
                MsgType::TReadLink,
                FCall::RReadLink {
                    target: "/etc/motd.real".to_owned(),
                },
            )
            .await;
    };

    let (n, _) = tokio::join!(link.read(&mut buf, 0), serve);
    assert_eq!(&buf[..n.unwrap()], b"/etc/motd.real");

    let (clunked, _) = tokio::join!(link.clunk(), expect_clunk(&mut server, 2));
    clunked.unwrap();
}

#[tokio::test]
async fn open_is_idempotent_and_widens() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let mut file = walked(&mut server, &root, "log").await;

    let opened = FCall::RlOpen {
        qid: file_qid(2),
        iounit: 4096,
    };
    let (result, request) = tokio::join!(
        file.open(OpenMode::READ),
        server.expect(MsgType::TlOpen, opened.clone())
    );
    result.unwrap();
    assert_eq!(
        request,
        FCall::TlOpen {
            fid: 2,
            flags: lopen::RDONLY,
        }
    );
    assert_eq!(file.iounit(), 4096);

    // Already granted, nothing goes out
    file.open(OpenMode::READ).await.unwrap();

    let (result, request) = tokio::join!(
        file.open(OpenMode::WRITE),
        server.expect(MsgType::TlOpen, opened)
    );
    result.unwrap();
    assert_eq!(
        request,
        FCall::TlOpen {
            fid: 2,
            flags: lopen::RDWR,
        }
    );
    assert_eq!(file.open_mode(), OpenMode::RDWR);

    let (clunked, _) = tokio::join!(file.clunk(), expect_clunk(&mut server, 2));
    clunked.unwrap();
}

#[tokio::test]
async fn write_is_clamped_to_msize() {
    let (_session, mut server, root) = attached(P92000L, 4096).await;
    let mut file = walked(&mut server, &root, "big").await;

    let data = vec![0x5a; 10000];
    let serve = async {
        server
            .expect(
                MsgType::TlOpen,
                FCall::RlOpen {
                    qid: file_qid(2),
                    iounit: 0,
                },
            )
            .await;
        server
            .expect(MsgType::TWrite, FCall::RWrite { count: 4072 })
            .await
    };

    let (written, request) = tokio::join!(file.write(&data, 0), serve);
    assert_eq!(written.unwrap(), 4072);
    match request {
        FCall::TWrite { fid, offset, data } => {
            assert_eq!(fid, 2);
            assert_eq!(offset, 0);
            assert_eq!(data.0.len(), 4096 - 24);
        }
        other => panic!("unexpected request {:?}", other),
    }

    let (clunked, _) = tokio::join!(file.clunk(), expect_clunk(&mut server, 2));
    clunked.unwrap();
}

#[tokio::test]
async fn getattr_keeps_defaults_for_invalid_fields() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;

    let reported = Stat {
        mode: 0o40755,
        uid: 0,
        size: 4096,
        ..Default::default()
    };
    let (stat, request) = tokio::join!(
        root.getattr(Stat {
            uid: 1000,
            ..Default::default()
        }),
        server.expect(
            MsgType::TGetAttr,
            FCall::RGetAttr {
                valid: GetAttrMask::MODE | GetAttrMask::SIZE,
                qid: dir_qid(1),
                stat: reported,
            }
        )
    );
    assert_eq!(
        request,
        FCall::TGetAttr {
            fid: 1,
            req_mask: GetAttrMask::BASIC,
        }
    );

    let stat = stat.unwrap();
    assert_eq!(stat.mode, 0o40755);
    assert_eq!(stat.size, 4096);
    assert_eq!(stat.uid, 1000);
}

#[tokio::test]
async fn readdir_spans_several_replies() {
    let (session, mut server, root) = attached(P92000L, 8192).await;

    let serve = async {
        let clone = server
            .expect(MsgType::TWalk, FCall::RWalk { wqids: Vec::new() })
            .await;
        assert_eq!(
            clone,
            FCall::TWalk {
                fid: 1,
                newfid: 2,
                wnames: Vec::new(),
            }
        );
        server
            .expect(
                MsgType::TlOpen,
                FCall::RlOpen {
                    qid: dir_qid(1),
                    iounit: 0,
                },
            )
            .await;

        let mut offsets = Vec::new();
        let pages = vec![
            vec![dirent("a", 1), dirent("b", 2)],
            vec![dirent("c", 3)],
            Vec::new(),
        ];
        for page in pages {
            let request = server
                .expect(
                    MsgType::TReadDir,
                    FCall::RReadDir {
                        data: DirEntryData::with(page),
                    },
                )
                .await;
            match request {
                FCall::TReadDir { fid, offset, count } => {
                    assert_eq!(fid, 2);
                    assert_eq!(count, 8192 - 24);
                    offsets.push(offset);
                }
                other => panic!("unexpected request {:?}", other),
            }
        }
        expect_clunk(&mut server, 2).await;
        offsets
    };

    let (entries, offsets) = tokio::join!(root.readdir(), serve);
    let names: Vec<String> = entries.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(offsets, vec![0, 2, 3]);
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn readdir_clunks_once_on_failure() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;

    let serve = async {
        server
            .expect(MsgType::TWalk, FCall::RWalk { wqids: Vec::new() })
            .await;
        server
            .expect(
                MsgType::TlOpen,
                FCall::RlOpen {
                    qid: dir_qid(1),
                    iounit: 0,
                },
            )
            .await;
        server
            .expect(
                MsgType::TReadDir,
                FCall::RReadDir {
                    data: DirEntryData::with(vec![dirent("a", 1)]),
                },
            )
            .await;
        server
            .expect(MsgType::TReadDir, FCall::RlError { ecode: EACCES as u32 })
            .await;
        expect_clunk(&mut server, 2).await;
    };

    let (entries, _) = tokio::join!(root.readdir(), serve);
    assert_eq!(entries.unwrap_err().errno(), EACCES);

    // The next request on the wire is not a second clunk
    let (result, _) = tokio::join!(
        root.truncate(0),
        server.expect(MsgType::TSetAttr, FCall::RSetAttr)
    );
    result.unwrap();
}

#[tokio::test]
async fn readdir_of_plan9_directory() {
    let (_session, mut server, root) = attached(P92000, 8192).await;

    let mut packed = Vec::new();
    for (path, name) in [(2, "lib"), (3, "profile")] {
        let stat = p92000::Stat {
            qid: if path == 2 { dir_qid(path) } else { file_qid(path) },
            mode: if path == 2 { p92000::dm::DIR | 0o755 } else { 0o644 },
            name: name.to_owned(),
            uid: "glenda".to_owned(),
            gid: "glenda".to_owned(),
            muid: "glenda".to_owned(),
            ..Default::default()
        };
        stat.encode(&mut packed).unwrap();
    }
    let packed_len = packed.len() as u64;

    let serve = async {
        server
            .expect(MsgType::TWalk, FCall::RWalk { wqids: Vec::new() })
            .await;
        let open = server
            .expect(
                MsgType::TOpen,
                FCall::ROpen {
                    qid: dir_qid(1),
                    iounit: 0,
                },
            )
            .await;
        assert_eq!(
            open,
            FCall::TOpen {
                fid: 2,
                mode: p92000::om::READ,
            }
        );
        server
            .expect(MsgType::TRead, FCall::RRead { data: Data(packed) })
            .await;
        let last = server
            .expect(MsgType::TRead, FCall::RRead { data: Data(Vec::new()) })
            .await;
        match last {
            FCall::TRead { offset, .. } => assert_eq!(offset, packed_len),
            other => panic!("unexpected request {:?}", other),
        }
        expect_clunk(&mut server, 2).await;
    };

    let (entries, _) = tokio::join!(root.readdir(), serve);
    let entries = entries.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "lib");
    assert_eq!(entries[0].typ, 4);
    assert_eq!(entries[1].name, "profile");
    assert_eq!(entries[1].typ, 8);
}

#[tokio::test]
async fn getattr_of_plan9_file() {
    let (_session, mut server, root) = attached(P92000, 8192).await;

    let (stat, request) = tokio::join!(
        root.getattr(Stat::default()),
        server.expect(
            MsgType::TStat,
            FCall::RStat {
                stat: p92000::Stat {
                    qid: dir_qid(1),
                    mode: p92000::dm::DIR | 0o775,
                    length: 0,
                    mtime: 1_700_000_000,
                    name: "/".to_owned(),
                    ..Default::default()
                },
            }
        )
    );
    assert_eq!(request, FCall::TStat { fid: 1 });

    let stat = stat.unwrap();
    assert_eq!(stat.mode & 0o777, 0o775);
    assert_eq!(stat.mode & 0o170000, 0o040000);
    assert_eq!(stat.mtime.sec, 1_700_000_000);
}

#[tokio::test]
async fn truncate_depends_on_dialect() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let (result, request) = tokio::join!(
        root.truncate(100),
        server.expect(MsgType::TSetAttr, FCall::RSetAttr)
    );
    result.unwrap();
    match request {
        FCall::TSetAttr { fid, valid, stat } => {
            assert_eq!(fid, 1);
            assert_eq!(valid, SetAttrMask::SIZE);
            assert_eq!(stat.size, 100);
        }
        other => panic!("unexpected request {:?}", other),
    }

    let (_session, mut server, root) = attached(P92000, 8192).await;
    root.truncate(100).await.unwrap();
    assert_eq!(root.statfs().await.unwrap_err().errno(), EOPNOTSUPP);

    // Neither call put anything on the wire
    let (result, _) = tokio::join!(
        root.getattr(Stat::default()),
        server.expect(
            MsgType::TStat,
            FCall::RStat {
                stat: p92000::Stat::default(),
            }
        )
    );
    result.unwrap();
}

#[tokio::test]
async fn failed_walk_leaves_no_fid_behind() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;

    let (file, _) = tokio::join!(
        root.walk("missing"),
        server.expect(MsgType::TWalk, FCall::RWalk { wqids: Vec::new() })
    );
    assert_eq!(file.unwrap_err().errno(), ENOENT);

    let (file, _) = tokio::join!(
        root.walk("forbidden"),
        server.expect(MsgType::TWalk, FCall::RlError { ecode: EACCES as u32 })
    );
    assert_eq!(file.unwrap_err().errno(), EACCES);

    // No clunk for the unbound fids, and fids are not reused
    let (file, request) = tokio::join!(
        root.walk("etc"),
        server.expect(
            MsgType::TWalk,
            FCall::RWalk {
                wqids: vec![dir_qid(9)]
            }
        )
    );
    match request {
        FCall::TWalk { newfid, .. } => assert_eq!(newfid, 4),
        other => panic!("unexpected request {:?}", other),
    }

    let (clunked, _) = tokio::join!(file.unwrap().clunk(), expect_clunk(&mut server, 4));
    clunked.unwrap();
}

#[tokio::test]
async fn long_paths_are_walked_in_chunks() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let names: Vec<String> = (0..20).map(|i| format!("d{}", i)).collect();

    let serve = async {
        let first = server
            .expect(
                MsgType::TWalk,
                FCall::RWalk {
                    wqids: (0..16).map(dir_qid).collect(),
                },
            )
            .await;
        let second = server
            .expect(
                MsgType::TWalk,
                FCall::RWalk {
                    wqids: (16..20).map(dir_qid).collect(),
                },
            )
            .await;
        (first, second)
    };

    let (file, (first, second)) = tokio::join!(root.walk_path(&names), serve);
    let file = file.unwrap();
    assert_eq!(file.qid(), dir_qid(19));
    match first {
        FCall::TWalk {
            fid,
            newfid,
            wnames,
        } => {
            assert_eq!((fid, newfid), (1, 2));
            assert_eq!(wnames[..], names[..16]);
        }
        other => panic!("unexpected request {:?}", other),
    }
    match second {
        FCall::TWalk {
            fid,
            newfid,
            wnames,
        } => {
            assert_eq!((fid, newfid), (2, 2));
            assert_eq!(wnames[..], names[16..]);
        }
        other => panic!("unexpected request {:?}", other),
    }

    let (clunked, _) = tokio::join!(file.clunk(), expect_clunk(&mut server, 2));
    clunked.unwrap();
}

#[tokio::test]
async fn dropping_a_file_clunks_it() {
    let (_session, mut server, root) = attached(P92000L, 8192).await;
    let file = walked(&mut server, &root, "tmp").await;

    drop(file);
    expect_clunk(&mut server, 2).await;
}
