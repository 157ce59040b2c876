//! 9P protocol data types and constants.
//!
//! # Protocol
//! 9P2000/9P2000.u/9P2000.L

use std::mem::{size_of, size_of_val};

use bitflags::bitflags;
use enum_primitive::*;

/// 9P2000 version string
pub const P92000: &str = "9P2000";

/// 9P2000.u version string
pub const P92000U: &str = "9P2000.u";

/// 9P2000.L version string
pub const P92000L: &str = "9P2000.L";

/// The version string that comes with RVersion when the server does not understand
/// the client's version string
pub const VERSION_UNKNOWN: &str = "unknown";

/*
 * 9P magic numbers
 */
/// Special tag which `TVersion`/`RVersion` must use as `tag`
pub const NOTAG: u16 = !0;

/// Special value which `TAttach` with no auth must use as `afid`
///
/// If the client does not wish to authenticate the connection, or knows that authentication is
/// not required, the afid field in the attach message should be set to `NOFID`
pub const NOFID: u32 = !0;

/// Special uid which `TAuth`/`TAttach` use as `n_uname` to indicate no uid is specified
pub const NONUNAME: u32 = !0;

/// Ample room for `TWrite`/`RRead` header
///
/// size[4] TRead/TWrite[2] tag[2] fid[4] offset[8] count[4]
pub const IOHDRSZ: u32 = 24;

/// Room for readdir header
pub const READDIRHDRSZ: u32 = 24;

/// size[4] type[1] tag[2]
pub const HEADER_SIZE: usize = 7;

/// Maximum number of path elements in a single `TWalk`
pub const MAXWELEM: usize = 16;

/// Upper bound for the byte budget of a single `TReadDir`
pub const READDIR_BUDGET: u32 = 8 * 1024 * 1024;


/// Protocol dialect negotiated with `TVersion`.
///
/// Variants are ordered, so `dialect >= Dialect::DotU` reads as "9P2000.u or newer".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dialect {
    /// Plain 9P2000
    #[default]
    Baseline,
    /// 9P2000.u, Unix extensions
    DotU,
    /// 9P2000.L, Linux extensions
    DotL,
}

impl Dialect {
    /// Map the version string of an `RVersion` to the closest known dialect.
    ///
    /// Anything that is not recognized falls back to [`Dialect::Baseline`].
    pub fn from_version(version: &str) -> Dialect {
        match version {
            P92000L => Dialect::DotL,
            P92000U => Dialect::DotU,
            _ => Dialect::Baseline,
        }
    }

    /// The version string announcing this dialect.
    pub fn version(&self) -> &'static str {
        match *self {
            Dialect::Baseline => P92000,
            Dialect::DotU => P92000U,
            Dialect::DotL => P92000L,
        }
    }
}

/// Old 9P2000 protocol types
///
/// Used by 9P2000 and 9P2000.u sessions.
pub mod p92000 {
    /// The type of I/O
    ///
    /// Open mode to be checked against the permissions for the file.
    pub mod om {
        /// Open for read
        pub const READ: u8 = 0;
        /// Write
        pub const WRITE: u8 = 1;
        /// Read and write
        pub const RDWR: u8 = 2;
    }

    /// Bits in Stat.mode
    pub mod dm {
        /// Mode bit for directories
        pub const DIR: u32 = 0x80000000;
        /// Mode bit for append only files
        pub const APPEND: u32 = 0x40000000;
        /// Mode bit for exclusive use files
        pub const EXCL: u32 = 0x20000000;
        /// Mode bit for symbolic links (9P2000.u)
        pub const SYMLINK: u32 = 0x02000000;
        /// Permission bits
        pub const PERM: u32 = 0o777;
    }

    /// Plan 9 Namespace metadata (somewhat like a unix fstat)
    ///
    /// NOTE: Defined as `Dir` in libc.h of Plan 9
    #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Stat {
        /// Server type
        pub typ: u16,
        /// Server subtype
        pub dev: u32,
        /// Unique id from server
        pub qid: super::QId,
        /// Permissions
        pub mode: u32,
        /// Last read time
        pub atime: u32,
        /// Last write time
        pub mtime: u32,
        /// File length
        pub length: u64,
        /// Last element of path
        pub name: String,
        /// Owner name
        pub uid: String,
        /// Group name
        pub gid: String,
        /// Last modifier name
        pub muid: String,
    }

    impl Stat {
        /// Get the current size of the stat, not counting its own size field
        ///
        /// `None` if the record is too long for its 16-bit size field.
        pub fn size(&self) -> Option<u16> {
            use std::mem::{size_of, size_of_val};
            let size = size_of_val(&self.typ)
                + size_of_val(&self.dev)
                + self.qid.size() as usize
                + size_of_val(&self.mode)
                + size_of_val(&self.atime)
                + size_of_val(&self.mtime)
                + size_of_val(&self.length)
                + (size_of::<u16>() * 4)
                + self.name.len()
                + self.uid.len()
                + self.gid.len()
                + self.muid.len();
            u16::try_from(size).ok()
        }
    }
}

/// Open flags of `TlOpen`
///
/// # Protocol
/// 9P2000.L
pub mod lopen {
    pub const RDONLY: u32 = 0o0;
    pub const WRONLY: u32 = 0o1;
    pub const RDWR: u32 = 0o2;
}

bitflags! {
    /// Access modes granted to a fid by a successful open.
    #[derive(Copy, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct OpenMode: u8 {
        const READ      = 0x1;
        const WRITE     = 0x2;
        const RDWR      = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl OpenMode {
    /// Open mode byte of `TOpen`
    pub fn om(&self) -> u8 {
        if self.contains(OpenMode::RDWR) {
            p92000::om::RDWR
        } else if self.contains(OpenMode::WRITE) {
            p92000::om::WRITE
        } else {
            p92000::om::READ
        }
    }

    /// Open flags of `TlOpen`
    pub fn lflags(&self) -> u32 {
        if self.contains(OpenMode::RDWR) {
            lopen::RDWR
        } else if self.contains(OpenMode::WRITE) {
            lopen::WRONLY
        } else {
            lopen::RDONLY
        }
    }
}

bitflags! {
    /// Bits in QId.typ
    ///
    /// # Protocol
    /// 9P2000/9P2000.L
    #[derive(Copy, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct QIdType: u8 {
        #[doc = "Type bit for directories"]
        const DIR       = 0x80;
        #[doc = "Type bit for append only files"]
        const APPEND    = 0x40;
        #[doc = "Type bit for exclusive use files"]
        const EXCL      = 0x20;
        #[doc = "Type bit for mounted channel"]
        const MOUNT     = 0x10;
        #[doc = "Type bit for authentication file"]
        const AUTH      = 0x08;
        #[doc = "Type bit for not-backed-up file"]
        const TMP       = 0x04;
        #[doc = "Type bits for symbolic links (9P2000.u)"]
        const SYMLINK   = 0x02;
        #[doc = "Type bits for hard-link (9P2000.u)"]
        const LINK      = 0x01;
        #[doc = "Plain file"]
        const FILE      = 0x00;
    }
}

bitflags! {
    /// Bits in `mask` and `valid` of `TGetAttr` and `RGetAttr`.
    ///
    /// # Protocol
    /// 9P2000.L
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct GetAttrMask: u64 {
        const MODE          = 0x00000001;
        const NLINK         = 0x00000002;
        const UID           = 0x00000004;
        const GID           = 0x00000008;
        const RDEV          = 0x00000010;
        const ATIME         = 0x00000020;
        const MTIME         = 0x00000040;
        const CTIME         = 0x00000080;
        const INO           = 0x00000100;
        const SIZE          = 0x00000200;
        const BLOCKS        = 0x00000400;

        const BTIME         = 0x00000800;
        const GEN           = 0x00001000;
        const DATA_VERSION  = 0x00002000;

        #[doc = "Mask for fields up to BLOCKS"]
        const BASIC         =0x000007ff;
        #[doc = "Mask for All fields above"]
        const ALL           = 0x00003fff;
    }
}

bitflags! {
    /// Bits in `mask` of `TSetAttr`.
    ///
    /// If a time bit is set without the corresponding SET bit, the current
    /// system time on the server is used instead of the value sent in the request.
    ///
    /// # Protocol
    /// 9P2000.L
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct SetAttrMask: u32 {
        const MODE      = 0x00000001;
        const UID       = 0x00000002;
        const GID       = 0x00000004;
        const SIZE      = 0x00000008;
        const ATIME     = 0x00000010;
        const MTIME     = 0x00000020;
        const CTIME     = 0x00000040;
        const ATIME_SET = 0x00000080;
        const MTIME_SET = 0x00000100;
    }
}

/// Server side data type for path tracking
///
/// The server's unique identification for the file being accessed
///
/// # Protocol
/// 9P2000/9P2000.L
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QId {
    /// Specify whether the file is a directory, append-only file, etc.
    pub typ: QIdType,
    /// Version number for a file; typically, it is incremented every time the file is modified
    pub version: u32,
    /// An integer which is unique among all files in the hierarchy
    pub path: u64,
}

impl QId {
    pub fn size(&self) -> u32 {
        (size_of::<QIdType>() + size_of::<u32>() + size_of::<u64>()) as u32
    }

    pub fn is_dir(&self) -> bool {
        self.typ.contains(QIdType::DIR)
    }

    pub fn is_symlink(&self) -> bool {
        self.typ.contains(QIdType::SYMLINK)
    }
}

/// Filesystem information corresponding to `struct statfs` of Linux.
///
/// # Protocol
/// 9P2000.L
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatFs {
    /// Type of file system
    pub typ: u32,
    /// Optimal transfer block size
    pub bsize: u32,
    /// Total data blocks in file system
    pub blocks: u64,
    /// Free blocks in fs
    pub bfree: u64,
    /// Free blocks avail to non-superuser
    pub bavail: u64,
    /// Total file nodes in file system
    pub files: u64,
    /// Free file nodes in fs
    pub ffree: u64,
    /// Filesystem ID
    pub fsid: u64,
    /// Maximum length of filenames
    pub namelen: u32,
}

/// Time struct
///
/// # Protocol
/// 9P2000.L
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time {
    pub sec: u64,
    pub nsec: u64,
}

/// File attributes corresponding to `struct stat` of Linux.
///
/// # Protocol
/// 9P2000.L
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stat {
    /// Protection
    pub mode: u32,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// Number of hard links
    pub nlink: u64,
    /// Device ID (if special file)
    pub rdev: u64,
    /// Total size, in bytes
    pub size: u64,
    /// Blocksize for file system I/O
    pub blksize: u64,
    /// Number of 512B blocks allocated
    pub blocks: u64,
    /// Time of last access
    pub atime: Time,
    /// Time of last modification
    pub mtime: Time,
    /// Time of last status change
    pub ctime: Time,
}

/// Subset of `Stat` used for `TSetAttr`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SetAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: Time,
    pub mtime: Time,
}

/// Directory entry used in `RReadDir`
///
/// # Protocol
/// 9P2000.L
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    /// QId for this directory
    pub qid: QId,
    /// Offset to resume reading the directory after this entry
    pub offset: u64,
    /// Corresponds to `d_type` of `struct dirent`
    pub typ: u8,
    /// Directory name
    pub name: String,
}

impl DirEntry {
    pub fn size(&self) -> u32 {
        (self.qid.size() as usize
            + size_of_val(&self.offset)
            + size_of_val(&self.typ)
            + size_of::<u16>()
            + self.name.len()) as u32
    }
}

/// Directory entry array
///
/// On the wire this is a `u32` byte count followed by packed entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntryData {
    pub data: Vec<DirEntry>,
}

impl DirEntryData {
    pub fn new() -> DirEntryData {
        Self::with(Vec::new())
    }

    pub fn with(v: Vec<DirEntry>) -> DirEntryData {
        DirEntryData { data: v }
    }

    pub fn data(&self) -> &[DirEntry] {
        &self.data
    }

    pub fn size(&self) -> u32 {
        self.data.iter().fold(0, |a, e| a + e.size())
    }

    pub fn push(&mut self, entry: DirEntry) {
        self.data.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Data type used in `RRead` and `TWrite`
///
/// # Protocol
/// 9P2000/9P2000.L
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Data(pub Vec<u8>);

enum_from_primitive! {
    #[doc = "Message type, 9P operations"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum MsgType {
        // 9P2000.L
        TlError         = 6,    // Illegal, never used
        RlError,
        TStatFs         = 8,
        RStatFs,
        TlOpen          = 12,
        RlOpen,
        TReadLink       = 22,
        RReadLink,
        TGetAttr        = 24,
        RGetAttr,
        TSetAttr        = 26,
        RSetAttr,
        TReadDir        = 40,
        RReadDir,
        TFSync          = 50,
        RFSync,

        // 9P2000
        TVersion        = 100,
        RVersion,
        TAttach         = 104,
        RAttach,
        TError          = 106,  // Illegal, never used
        RError,
        TWalk           = 110,
        RWalk,
        TOpen           = 112,
        ROpen,
        TRead           = 116,
        RRead,
        TWrite          = 118,
        RWrite,
        TClunk          = 120,
        RClunk,
        TStat           = 124,
        RStat,
    }
}

impl MsgType {
    /// If the message type is T-message
    pub fn is_t(&self) -> bool {
        !self.is_r()
    }

    /// If the message type is R-message
    pub fn is_r(&self) -> bool {
        (*self as u8) % 2 == 1
    }

    /// If the message type reports a failure
    pub fn is_error(&self) -> bool {
        matches!(*self, MsgType::RlError | MsgType::RError)
    }

    /// The reply type expected for a T-message, which is always the next opcode
    pub fn reply(&self) -> Option<MsgType> {
        if self.is_t() {
            MsgType::from_u8(*self as u8 + 1)
        } else {
            None
        }
    }
}

impl<'a> From<&'a FCall> for MsgType {
    fn from(fcall: &'a FCall) -> MsgType {
        match *fcall {
            FCall::RlError { .. } => MsgType::RlError,
            FCall::TStatFs { .. } => MsgType::TStatFs,
            FCall::RStatFs { .. } => MsgType::RStatFs,
            FCall::TlOpen { .. } => MsgType::TlOpen,
            FCall::RlOpen { .. } => MsgType::RlOpen,
            FCall::TReadLink { .. } => MsgType::TReadLink,
            FCall::RReadLink { .. } => MsgType::RReadLink,
            FCall::TGetAttr { .. } => MsgType::TGetAttr,
            FCall::RGetAttr { .. } => MsgType::RGetAttr,
            FCall::TSetAttr { .. } => MsgType::TSetAttr,
            FCall::RSetAttr => MsgType::RSetAttr,
            FCall::TReadDir { .. } => MsgType::TReadDir,
            FCall::RReadDir { .. } => MsgType::RReadDir,
            FCall::TFSync { .. } => MsgType::TFSync,
            FCall::RFSync => MsgType::RFSync,
            FCall::TVersion { .. } => MsgType::TVersion,
            FCall::RVersion { .. } => MsgType::RVersion,
            FCall::TAttach { .. } => MsgType::TAttach,
            FCall::RAttach { .. } => MsgType::RAttach,
            FCall::RError { .. } => MsgType::RError,
            FCall::TWalk { .. } => MsgType::TWalk,
            FCall::RWalk { .. } => MsgType::RWalk,
            FCall::TOpen { .. } => MsgType::TOpen,
            FCall::ROpen { .. } => MsgType::ROpen,
            FCall::TRead { .. } => MsgType::TRead,
            FCall::RRead { .. } => MsgType::RRead,
            FCall::TWrite { .. } => MsgType::TWrite,
            FCall::RWrite { .. } => MsgType::RWrite,
            FCall::TClunk { .. } => MsgType::TClunk,
            FCall::RClunk => MsgType::RClunk,
            FCall::TStat { .. } => MsgType::TStat,
            FCall::RStat { .. } => MsgType::RStat,
        }
    }
}

/// A data type encapsulating the 9P messages spoken by the client
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FCall {
    // 9P2000.L
    RlError {
        ecode: u32,
    },
    TStatFs {
        fid: u32,
    },
    RStatFs {
        statfs: StatFs,
    },
    TlOpen {
        fid: u32,
        flags: u32,
    },
    RlOpen {
        qid: QId,
        iounit: u32,
    },
    TReadLink {
        fid: u32,
    },
    RReadLink {
        target: String,
    },
    TGetAttr {
        fid: u32,
        req_mask: GetAttrMask,
    },
    /// Reserved members specified in the protocol are handled in Encodable/Decodable traits.
    RGetAttr {
        valid: GetAttrMask,
        qid: QId,
        stat: Stat,
    },
    TSetAttr {
        fid: u32,
        valid: SetAttrMask,
        stat: SetAttr,
    },
    RSetAttr,
    TReadDir {
        fid: u32,
        offset: u64,
        count: u32,
    },
    RReadDir {
        data: DirEntryData,
    },
    TFSync {
        fid: u32,
    },
    RFSync,

    // 9P2000, with the 9P2000.u/9P2000.L extensions noted per field
    TVersion {
        msize: u32,
        version: String,
    },
    RVersion {
        msize: u32,
        version: String,
    },
    /// `n_uname` is only on the wire for 9P2000.u and 9P2000.L
    TAttach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
        n_uname: u32,
    },
    RAttach {
        qid: QId,
    },
    /// `errno` is only on the wire for 9P2000.u
    RError {
        ename: String,
        errno: u32,
    },
    TWalk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    RWalk {
        wqids: Vec<QId>,
    },
    TOpen {
        fid: u32,
        mode: u8,
    },
    ROpen {
        qid: QId,
        iounit: u32,
    },
    TRead {
        fid: u32,
        offset: u64,
        count: u32,
    },
    RRead {
        data: Data,
    },
    TWrite {
        fid: u32,
        offset: u64,
        data: Data,
    },
    RWrite {
        count: u32,
    },
    TClunk {
        fid: u32,
    },
    RClunk,
    TStat {
        fid: u32,
    },
    RStat {
        stat: p92000::Stat,
    },
}

impl FCall {
    /// The oldest dialect in which this message exists
    pub fn min_dialect(&self) -> Dialect {
        match MsgType::from(self) {
            MsgType::RlError
            | MsgType::TStatFs
            | MsgType::RStatFs
            | MsgType::TlOpen
            | MsgType::RlOpen
            | MsgType::TReadLink
            | MsgType::RReadLink
            | MsgType::TGetAttr
            | MsgType::RGetAttr
            | MsgType::TSetAttr
            | MsgType::RSetAttr
            | MsgType::TReadDir
            | MsgType::RReadDir
            | MsgType::TFSync
            | MsgType::RFSync => Dialect::DotL,
            _ => Dialect::Baseline,
        }
    }
}
