//! Remote files: a fid bound on the server plus what the client knows about it.
//!
//! A [`RemoteFile`] owns its fid. Dropping it clunks the fid in the background;
//! [`RemoteFile::clunk`] does the same without waiting for the server.

use {
    crate::{
        error::{Error, errno::*},
        fcall::*,
        serialize,
        session::Session,
        utils::Result,
    },
    log::{debug, warn},
    nix::sys::stat::SFlag,
    std::sync::Arc,
};

/// `d_type` values reported for directory entries listed through `TRead`
const DT_DIR: u8 = 4;
const DT_REG: u8 = 8;
const DT_LNK: u8 = 10;

/// A fid bound to a file on the server.
#[derive(Debug)]
pub struct RemoteFile {
    session: Arc<Session>,
    fid: u32,
    qid: QId,
    mode: OpenMode,
    iounit: u32,
    clunked: bool,
}

impl RemoteFile {
    /// Attach to the tree named in the session's configuration.
    pub async fn attach(session: &Arc<Session>) -> Result<RemoteFile> {
        let config = session.config();
        let fid = session.allocate_fid()?;

        let qid = match session
            .rpc(FCall::TAttach {
                fid,
                afid: NOFID,
                uname: config.uname.clone(),
                aname: config.aname.clone(),
                n_uname: config.n_uname,
            })
            .await?
        {
            FCall::RAttach { qid } => qid,
            _ => return Err(Error::No(EIO)),
        };

        Ok(RemoteFile::bound(session.clone(), fid, qid))
    }

    fn bound(session: Arc<Session>, fid: u32, qid: QId) -> RemoteFile {
        RemoteFile {
            session,
            fid,
            qid,
            mode: OpenMode::empty(),
            iounit: 0,
            clunked: false,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn fid(&self) -> u32 {
        self.fid
    }

    pub fn qid(&self) -> QId {
        self.qid
    }

    /// Access modes granted so far
    pub fn open_mode(&self) -> OpenMode {
        self.mode
    }

    /// I/O unit reported by the last open, 0 if unknown
    pub fn iounit(&self) -> u32 {
        self.iounit
    }

    pub fn is_dir(&self) -> bool {
        self.qid.is_dir()
    }

    /// Look up `name` in this directory.
    pub async fn walk(&self, name: &str) -> Result<RemoteFile> {
        self.walk_path(&[name]).await
    }

    /// Look up a relative path given as its elements.
    ///
    /// Paths longer than `MAXWELEM` elements are walked in several requests.
    pub async fn walk_path<S: AsRef<str>>(&self, names: &[S]) -> Result<RemoteFile> {
        let mut chunks = names.chunks(MAXWELEM);
        let first = match chunks.next() {
            Some(first) => first,
            None => return self.clone_fid().await,
        };

        let newfid = self.session.allocate_fid()?;
        // Until this walk succeeds the new fid is not bound and must not be clunked.
        let qid = self.walk_chunk(self.fid, newfid, first).await?;
        let mut file = RemoteFile::bound(self.session.clone(), newfid, qid);

        for chunk in chunks {
            match self.walk_chunk(newfid, newfid, chunk).await {
                Ok(qid) => file.qid = qid,
                Err(e) => {
                    if let Err(ce) = file.clunk().await {
                        warn!("Failed to clunk fid {}: {}", newfid, ce);
                    }
                    return Err(e);
                }
            }
        }

        Ok(file)
    }

    async fn walk_chunk<S: AsRef<str>>(&self, fid: u32, newfid: u32, names: &[S]) -> Result<QId> {
        let wnames: Vec<String> = names.iter().map(|n| n.as_ref().to_owned()).collect();
        let wqids = match self
            .session
            .rpc(FCall::TWalk {
                fid,
                newfid,
                wnames,
            })
            .await?
        {
            FCall::RWalk { wqids } => wqids,
            _ => return Err(Error::No(EIO)),
        };

        if wqids.len() < names.len() {
            debug!(
                "walk from fid {} stopped after {} of {} elements",
                fid,
                wqids.len(),
                names.len()
            );
            return Err(Error::No(ENOENT));
        }

        wqids.last().copied().ok_or(Error::No(EIO))
    }

    /// Bind a new fid to the same file.
    pub async fn clone_fid(&self) -> Result<RemoteFile> {
        let newfid = self.session.allocate_fid()?;
        match self
            .session
            .rpc(FCall::TWalk {
                fid: self.fid,
                newfid,
                wnames: Vec::new(),
            })
            .await?
        {
            FCall::RWalk { .. } => Ok(RemoteFile::bound(self.session.clone(), newfid, self.qid)),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Make sure the fid is open for at least `mode`.
    pub async fn open(&mut self, mode: OpenMode) -> Result<()> {
        if self.mode.contains(mode) {
            return Ok(());
        }

        let wanted = self.mode | mode;
        let (qid, iounit) = match self.session.dialect() {
            Dialect::DotL => match self
                .session
                .rpc(FCall::TlOpen {
                    fid: self.fid,
                    flags: wanted.lflags(),
                })
                .await?
            {
                FCall::RlOpen { qid, iounit } => (qid, iounit),
                _ => return Err(Error::No(EIO)),
            },
            Dialect::Baseline | Dialect::DotU => match self
                .session
                .rpc(FCall::TOpen {
                    fid: self.fid,
                    mode: wanted.om(),
                })
                .await?
            {
                FCall::ROpen { qid, iounit } => (qid, iounit),
                _ => return Err(Error::No(EIO)),
            },
        };

        self.qid = qid;
        self.iounit = iounit;
        self.mode = wanted;
        Ok(())
    }

    /// Largest payload a single read or write request may carry.
    fn io_size(&self, len: usize) -> u32 {
        let max = self.session.msize().saturating_sub(IOHDRSZ);
        len.min(max as usize) as u32
    }

    /// Read up to `buf.len()` bytes at `offset`.
    pub async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.open(OpenMode::READ).await?;
        let count = self.io_size(buf.len());

        if self.session.dialect() == Dialect::DotL && offset == 0 {
            let request = FCall::TReadLink { fid: self.fid };
            if let FCall::RReadLink { target } = self.session.call(&request, false).await? {
                return Ok(copy_out(buf, count, target.as_bytes()));
            }
        }

        match self
            .session
            .rpc(FCall::TRead {
                fid: self.fid,
                offset,
                count,
            })
            .await?
        {
            FCall::RRead { data } => Ok(copy_out(buf, count, &data.0)),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Write as much of `data` at `offset` as fits in one message.
    ///
    /// Returns the number of bytes the server accepted.
    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        self.open(OpenMode::WRITE).await?;
        let count = self.io_size(data.len()) as usize;

        match self
            .session
            .rpc(FCall::TWrite {
                fid: self.fid,
                offset,
                data: Data(data[..count].to_vec()),
            })
            .await?
        {
            FCall::RWrite { count } => Ok(count as usize),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Fetch attributes, keeping `defaults` for whatever the server does not report.
    pub async fn getattr(&self, defaults: Stat) -> Result<Stat> {
        match self.session.dialect() {
            Dialect::DotL => match self
                .session
                .rpc(FCall::TGetAttr {
                    fid: self.fid,
                    req_mask: GetAttrMask::BASIC,
                })
                .await?
            {
                FCall::RGetAttr { valid, stat, .. } => Ok(merge_attrs(defaults, valid, &stat)),
                _ => Err(Error::No(EIO)),
            },
            Dialect::Baseline | Dialect::DotU => {
                match self.session.rpc(FCall::TStat { fid: self.fid }).await? {
                    FCall::RStat { stat } => Ok(convert_stat(defaults, &stat)),
                    _ => Err(Error::No(EIO)),
                }
            }
        }
    }

    /// List the whole directory.
    ///
    /// Entries come back in server order. The listing goes through a fresh fid
    /// which is clunked before returning, whether the listing succeeded or not.
    pub async fn readdir(&self) -> Result<Vec<DirEntry>> {
        let mut dir = self.clone_fid().await?;
        let listing = dir.list().await;
        let clunked = dir.clunk().await;

        let entries = listing?;
        clunked?;
        Ok(entries)
    }

    async fn list(&mut self) -> Result<Vec<DirEntry>> {
        self.open(OpenMode::READ).await?;

        match self.session.dialect() {
            Dialect::DotL => self.list_dirents().await,
            Dialect::Baseline | Dialect::DotU => self.list_stats().await,
        }
    }

    async fn list_dirents(&self) -> Result<Vec<DirEntry>> {
        let count = READDIR_BUDGET.min(self.session.msize().saturating_sub(READDIRHDRSZ));
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let data = match self
                .session
                .rpc(FCall::TReadDir {
                    fid: self.fid,
                    offset,
                    count,
                })
                .await?
            {
                FCall::RReadDir { data } => data,
                _ => return Err(Error::No(EIO)),
            };

            match data.data().last() {
                Some(last) => offset = last.offset,
                None => break,
            }
            entries.extend(data.data);
        }

        Ok(entries)
    }

    async fn list_stats(&self) -> Result<Vec<DirEntry>> {
        let count = self.io_size(usize::MAX);
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let data = match self
                .session
                .rpc(FCall::TRead {
                    fid: self.fid,
                    offset,
                    count,
                })
                .await?
            {
                FCall::RRead { data } => data.0,
                _ => return Err(Error::No(EIO)),
            };

            if data.is_empty() {
                break;
            }
            offset += data.len() as u64;

            entries.extend(
                serialize::decode_stats(&data)?
                    .into_iter()
                    .map(|stat| DirEntry {
                        typ: dirent_type(&stat.qid),
                        qid: stat.qid,
                        offset,
                        name: stat.name,
                    }),
            );
        }

        Ok(entries)
    }

    /// Set the file size. Only 9P2000.L can express this; elsewhere it is a no-op.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        if self.session.dialect() != Dialect::DotL {
            debug!("truncate of fid {} ignored by {}", self.fid, self.session.dialect().version());
            return Ok(());
        }

        match self
            .session
            .rpc(FCall::TSetAttr {
                fid: self.fid,
                valid: SetAttrMask::SIZE,
                stat: SetAttr {
                    size,
                    ..Default::default()
                },
            })
            .await?
        {
            FCall::RSetAttr => Ok(()),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Target of a symbolic link.
    pub async fn readlink(&self) -> Result<String> {
        self.require_dotl()?;
        match self.session.rpc(FCall::TReadLink { fid: self.fid }).await? {
            FCall::RReadLink { target } => Ok(target),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Statistics of the file system holding this file.
    pub async fn statfs(&self) -> Result<StatFs> {
        self.require_dotl()?;
        match self.session.rpc(FCall::TStatFs { fid: self.fid }).await? {
            FCall::RStatFs { statfs } => Ok(statfs),
            _ => Err(Error::No(EIO)),
        }
    }

    /// Flush the file to stable storage on the server.
    pub async fn fsync(&self) -> Result<()> {
        self.require_dotl()?;
        match self.session.rpc(FCall::TFSync { fid: self.fid }).await? {
            FCall::RFSync => Ok(()),
            _ => Err(Error::No(EIO)),
        }
    }

    fn require_dotl(&self) -> Result<()> {
        match self.session.dialect() {
            Dialect::DotL => Ok(()),
            Dialect::Baseline | Dialect::DotU => Err(Error::No(EOPNOTSUPP)),
        }
    }

    /// Release the fid without waiting for the server to confirm.
    pub async fn clunk(mut self) -> Result<()> {
        self.clunked = true;
        self.session
            .rpc_ignore_reply(FCall::TClunk { fid: self.fid })
            .await
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        if self.clunked {
            return;
        }

        let fid = self.fid;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.session.clone();
                handle.spawn(async move {
                    if let Err(e) = session.rpc_ignore_reply(FCall::TClunk { fid }).await {
                        warn!("Failed to clunk fid {}: {}", fid, e);
                    }
                });
            }
            Err(_) => warn!("No runtime to clunk fid {}, leaking it", fid),
        }
    }
}

fn copy_out(buf: &mut [u8], count: u32, data: &[u8]) -> usize {
    let n = data.len().min(count as usize).min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    n
}

/// Keep the fields flagged in `valid`, take everything else from `defaults`.
fn merge_attrs(defaults: Stat, valid: GetAttrMask, stat: &Stat) -> Stat {
    let mut merged = defaults;

    if valid.contains(GetAttrMask::MODE) {
        merged.mode = stat.mode;
    }
    if valid.contains(GetAttrMask::NLINK) {
        merged.nlink = stat.nlink;
    }
    if valid.contains(GetAttrMask::UID) {
        merged.uid = stat.uid;
    }
    if valid.contains(GetAttrMask::GID) {
        merged.gid = stat.gid;
    }
    if valid.contains(GetAttrMask::RDEV) {
        merged.rdev = stat.rdev;
    }
    if valid.contains(GetAttrMask::ATIME) {
        merged.atime = stat.atime;
    }
    if valid.contains(GetAttrMask::MTIME) {
        merged.mtime = stat.mtime;
    }
    if valid.contains(GetAttrMask::CTIME) {
        merged.ctime = stat.ctime;
    }
    if valid.contains(GetAttrMask::SIZE) {
        merged.size = stat.size;
    }
    if valid.contains(GetAttrMask::BLOCKS) {
        merged.blocks = stat.blocks;
        merged.blksize = stat.blksize;
    }

    merged
}

/// Express a 9P2000 stat record the way 9P2000.L reports attributes.
fn convert_stat(defaults: Stat, stat: &p92000::Stat) -> Stat {
    let file_type = if stat.mode & p92000::dm::DIR != 0 {
        SFlag::S_IFDIR
    } else if stat.mode & p92000::dm::SYMLINK != 0 {
        SFlag::S_IFLNK
    } else {
        SFlag::S_IFREG
    };

    Stat {
        mode: file_type.bits() as u32 | (stat.mode & p92000::dm::PERM),
        size: stat.length,
        atime: Time {
            sec: stat.atime as u64,
            nsec: 0,
        },
        mtime: Time {
            sec: stat.mtime as u64,
            nsec: 0,
        },
        ..defaults
    }
}

fn dirent_type(qid: &QId) -> u8 {
    if qid.is_dir() {
        DT_DIR
    } else if qid.is_symlink() {
        DT_LNK
    } else {
        DT_REG
    }
}
