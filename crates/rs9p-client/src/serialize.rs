//! Serialize/deserialize 9P message fields and bodies into/from binary.

use crate::{fcall::*, io_err, res};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Result};
use std::mem;
use std::ops::Shl;

macro_rules! decode {
    ($decoder:expr) => {
        Decodable::decode(&mut $decoder)?
    };

    ($typ:ident, $buf:expr) => {
        $typ::from_bits_truncate(decode!($buf))
    };
}

// Grows with the bytes actually present, not with the declared size.
fn read_exact<R: Read>(r: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(size as u64).read_to_end(&mut buf)?;
    if buf.len() != size {
        return res!(io_err!(
            UnexpectedEof,
            format!("Field declares {} bytes but only {} remain", size, buf.len())
        ));
    }
    Ok(buf)
}

fn stat_size(stat: &p92000::Stat) -> Result<u16> {
    stat.size()
        .ok_or_else(|| io_err!(InvalidInput, "Stat record too long for its size field"))
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<, ?
pub struct SResult<T>(::std::io::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: encoder << data
    pub fn encode<T: Encodable>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

fn written<W>(buf: SResult<Encoder<W>>) -> Result<usize>
where
    W: WriteBytesExt,
{
    match buf {
        SResult(Ok(enc)) => Ok(enc.bytes_written()),
        SResult(Err(e)) => Err(e),
    }
}

/// Trait representing a type which can be serialized into binary
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for u8 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self).and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u16 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u16::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u64::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for String {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.as_str().encode(w)
    }
}

impl Encodable for &str {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        if self.len() > u16::MAX as usize {
            return res!(io_err!(InvalidInput, "String too long for a 9P string field"));
        }
        let mut bytes = (self.len() as u16).encode(w)?;
        bytes += w.write_all(self.as_bytes()).and(Ok(self.len()))?;
        Ok(bytes)
    }
}

impl Encodable for QId {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(Encoder::new(w) << &self.typ.bits() << &self.version << &self.path)
    }
}

impl Encodable for StatFs {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            Encoder::new(w)
                << &self.typ
                << &self.bsize
                << &self.blocks
                << &self.bfree
                << &self.bavail
                << &self.files
                << &self.ffree
                << &self.fsid
                << &self.namelen,
        )
    }
}

impl Encodable for Time {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(Encoder::new(w) << &self.sec << &self.nsec)
    }
}

impl Encodable for Stat {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            Encoder::new(w)
                << &self.mode
                << &self.uid
                << &self.gid
                << &self.nlink
                << &self.rdev
                << &self.size
                << &self.blksize
                << &self.blocks
                << &self.atime
                << &self.mtime
                << &self.ctime,
        )
    }
}

impl Encodable for SetAttr {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            Encoder::new(w)
                << &self.mode
                << &self.uid
                << &self.gid
                << &self.size
                << &self.atime
                << &self.mtime,
        )
    }
}

impl Encodable for p92000::Stat {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            Encoder::new(w)
                << &stat_size(self)?
                << &self.typ
                << &self.dev
                << &self.qid
                << &self.mode
                << &self.atime
                << &self.mtime
                << &self.length
                << &self.name
                << &self.uid
                << &self.gid
                << &self.muid,
        )
    }
}

impl Encodable for DirEntry {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(Encoder::new(w) << &self.qid << &self.offset << &self.typ << &self.name)
    }
}

impl Encodable for DirEntryData {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            self.data()
                .iter()
                .fold(Encoder::new(w) << &self.size(), |acc, e| acc << e),
        )
    }
}

impl Encodable for Data {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let size = self.0.len();
        let bytes = (size as u32).encode(w)? + size;
        w.write_all(&self.0)?;
        Ok(bytes)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        written(
            self.iter()
                .fold(Encoder::new(w) << &(self.len() as u16), |acc, s| acc << s),
        )
    }
}

/// Encode the body of `fcall` as spoken in `dialect`.
///
/// The header (size, type, tag) is not written here; see [`crate::message::Message`].
pub fn encode_body<W: WriteBytesExt>(w: &mut W, fcall: &FCall, dialect: Dialect) -> Result<usize> {
    use crate::FCall::*;

    if dialect < fcall.min_dialect() {
        return res!(io_err!(
            InvalidInput,
            format!("{:?} is not part of {}", MsgType::from(fcall), dialect.version())
        ));
    }

    let buf = Encoder::new(w);
    let buf = match *fcall {
        // 9P2000.L
        RlError { ref ecode } => buf << ecode,
        TStatFs { ref fid } => buf << fid,
        RStatFs { ref statfs } => buf << statfs,
        TlOpen { ref fid, ref flags } => buf << fid << flags,
        RlOpen {
            ref qid,
            ref iounit,
        } => buf << qid << iounit,
        TReadLink { ref fid } => buf << fid,
        RReadLink { ref target } => buf << target,
        TGetAttr {
            ref fid,
            ref req_mask,
        } => buf << fid << &req_mask.bits(),
        RGetAttr {
            ref valid,
            ref qid,
            ref stat,
        } => buf << &valid.bits() << qid << stat << &0u64 << &0u64 << &0u64 << &0u64,
        TSetAttr {
            ref fid,
            ref valid,
            ref stat,
        } => buf << fid << &valid.bits() << stat,
        RSetAttr => SResult(Ok(buf)),
        TReadDir {
            ref fid,
            ref offset,
            ref count,
        } => buf << fid << offset << count,
        RReadDir { ref data } => buf << data,
        TFSync { ref fid } => buf << fid,
        RFSync => SResult(Ok(buf)),

        /*
         * 9P2000 with the .u/.L extensions
         */
        TVersion {
            ref msize,
            ref version,
        } => buf << msize << version,
        RVersion {
            ref msize,
            ref version,
        } => buf << msize << version,
        TAttach {
            ref fid,
            ref afid,
            ref uname,
            ref aname,
            ref n_uname,
        } => {
            let buf = buf << fid << afid << uname << aname;
            match dialect {
                Dialect::Baseline => buf,
                Dialect::DotU | Dialect::DotL => buf << n_uname,
            }
        }
        RAttach { ref qid } => buf << qid,
        RError {
            ref ename,
            ref errno,
        } => match dialect {
            Dialect::DotU => buf << ename << errno,
            Dialect::Baseline | Dialect::DotL => buf << ename,
        },
        TWalk {
            ref fid,
            ref newfid,
            ref wnames,
        } => buf << fid << newfid << wnames,
        RWalk { ref wqids } => buf << wqids,
        TOpen { ref fid, ref mode } => buf << fid << mode,
        ROpen {
            ref qid,
            ref iounit,
        } => buf << qid << iounit,
        TRead {
            ref fid,
            ref offset,
            ref count,
        } => buf << fid << offset << count,
        RRead { ref data } => buf << data,
        TWrite {
            ref fid,
            ref offset,
            ref data,
        } => buf << fid << offset << data,
        RWrite { ref count } => buf << count,
        TClunk { ref fid } => buf << fid,
        RClunk => SResult(Ok(buf)),
        TStat { ref fid } => buf << fid,
        RStat { ref stat } => {
            let size = stat_size(stat)?
                .checked_add(2)
                .ok_or_else(|| io_err!(InvalidInput, "Stat record too long for its size field"))?;
            buf << &size << stat
        }
    };

    written(buf)
}

/// Trait representing a type which can be deserialized from binary
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for u8 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u8()
    }
}

impl Decodable for u16 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u16::<LittleEndian>()
    }
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u32::<LittleEndian>()
    }
}

impl Decodable for u64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u64::<LittleEndian>()
    }
}

impl Decodable for String {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        String::from_utf8(read_exact(r, len as usize)?)
            .map_err(|_| io_err!(InvalidData, "Invalid UTF-8 sequence"))
    }
}

impl Decodable for QId {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(QId {
            typ: decode!(QIdType, *r),
            version: Decodable::decode(r)?,
            path: Decodable::decode(r)?,
        })
    }
}

impl Decodable for StatFs {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(StatFs {
            typ: Decodable::decode(r)?,
            bsize: Decodable::decode(r)?,
            blocks: Decodable::decode(r)?,
            bfree: Decodable::decode(r)?,
            bavail: Decodable::decode(r)?,
            files: Decodable::decode(r)?,
            ffree: Decodable::decode(r)?,
            fsid: Decodable::decode(r)?,
            namelen: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Time {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Time {
            sec: Decodable::decode(r)?,
            nsec: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Stat {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Stat {
            mode: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
            nlink: Decodable::decode(r)?,
            rdev: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            blksize: Decodable::decode(r)?,
            blocks: Decodable::decode(r)?,
            atime: Decodable::decode(r)?,
            mtime: Decodable::decode(r)?,
            ctime: Decodable::decode(r)?,
        })
    }
}

impl Decodable for SetAttr {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(SetAttr {
            mode: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            atime: Decodable::decode(r)?,
            mtime: Decodable::decode(r)?,
        })
    }
}

// The size prefix bounds the record; 9P2000.u appends extension fields
// after `muid` which are skipped along with anything else unknown.
impl Decodable for p92000::Stat {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let size: u16 = Decodable::decode(r)?;
        let mut record = Cursor::new(read_exact(r, size as usize)?);
        let r = &mut record;
        Ok(p92000::Stat {
            typ: Decodable::decode(r)?,
            dev: Decodable::decode(r)?,
            qid: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            atime: Decodable::decode(r)?,
            mtime: Decodable::decode(r)?,
            length: Decodable::decode(r)?,
            name: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
            muid: Decodable::decode(r)?,
        })
    }
}

impl Decodable for DirEntry {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(DirEntry {
            qid: Decodable::decode(r)?,
            offset: Decodable::decode(r)?,
            typ: Decodable::decode(r)?,
            name: Decodable::decode(r)?,
        })
    }
}

impl Decodable for DirEntryData {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let count: u32 = Decodable::decode(r)?;
        let buf = read_exact(r, count as usize)?;
        let len = buf.len() as u64;
        let mut entries = Cursor::new(buf);
        let mut data = DirEntryData::new();
        while entries.position() < len {
            data.push(Decodable::decode(&mut entries)?);
        }
        Ok(data)
    }
}

impl Decodable for Data {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u32 = Decodable::decode(r)?;
        Ok(Data(read_exact(r, len as usize)?))
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        let mut buf = Vec::with_capacity(len as usize);
        for _ in 0..len {
            buf.push(Decodable::decode(r)?);
        }
        Ok(buf)
    }
}

/// Decode the body of a message of type `msg_type` as spoken in `dialect`.
pub fn decode_body<R: ReadBytesExt>(r: &mut R, msg_type: MsgType, dialect: Dialect) -> Result<FCall> {
    use crate::MsgType::*;

    let mut buf = r;

    let body = match msg_type {
        /*
         * 9P2000.L
         */
        RlError => FCall::RlError {
            ecode: decode!(buf),
        },
        TStatFs => FCall::TStatFs { fid: decode!(buf) },
        RStatFs => FCall::RStatFs {
            statfs: decode!(buf),
        },
        TlOpen => FCall::TlOpen {
            fid: decode!(buf),
            flags: decode!(buf),
        },
        RlOpen => FCall::RlOpen {
            qid: decode!(buf),
            iounit: decode!(buf),
        },
        TReadLink => FCall::TReadLink { fid: decode!(buf) },
        RReadLink => FCall::RReadLink {
            target: decode!(buf),
        },
        TGetAttr => FCall::TGetAttr {
            fid: decode!(buf),
            req_mask: decode!(GetAttrMask, buf),
        },
        RGetAttr => {
            let r = FCall::RGetAttr {
                valid: decode!(GetAttrMask, buf),
                qid: decode!(buf),
                stat: decode!(buf),
            };
            let (_btime, _gen, _ver): (Time, u64, u64) =
                (decode!(buf), decode!(buf), decode!(buf));
            r
        }
        TSetAttr => FCall::TSetAttr {
            fid: decode!(buf),
            valid: decode!(SetAttrMask, buf),
            stat: decode!(buf),
        },
        RSetAttr => FCall::RSetAttr,
        TReadDir => FCall::TReadDir {
            fid: decode!(buf),
            offset: decode!(buf),
            count: decode!(buf),
        },
        RReadDir => FCall::RReadDir { data: decode!(buf) },
        TFSync => FCall::TFSync { fid: decode!(buf) },
        RFSync => FCall::RFSync,

        /*
         * 9P2000 with the .u/.L extensions
         */
        TVersion => FCall::TVersion {
            msize: decode!(buf),
            version: decode!(buf),
        },
        RVersion => FCall::RVersion {
            msize: decode!(buf),
            version: decode!(buf),
        },
        TAttach => FCall::TAttach {
            fid: decode!(buf),
            afid: decode!(buf),
            uname: decode!(buf),
            aname: decode!(buf),
            n_uname: match dialect {
                Dialect::Baseline => NONUNAME,
                Dialect::DotU | Dialect::DotL => decode!(buf),
            },
        },
        RAttach => FCall::RAttach { qid: decode!(buf) },
        RError => FCall::RError {
            ename: decode!(buf),
            errno: match dialect {
                Dialect::DotU => decode!(buf),
                Dialect::Baseline | Dialect::DotL => 0,
            },
        },
        TWalk => FCall::TWalk {
            fid: decode!(buf),
            newfid: decode!(buf),
            wnames: decode!(buf),
        },
        RWalk => FCall::RWalk {
            wqids: decode!(buf),
        },
        TOpen => FCall::TOpen {
            fid: decode!(buf),
            mode: decode!(buf),
        },
        ROpen => FCall::ROpen {
            qid: decode!(buf),
            iounit: decode!(buf),
        },
        TRead => FCall::TRead {
            fid: decode!(buf),
            offset: decode!(buf),
            count: decode!(buf),
        },
        RRead => FCall::RRead { data: decode!(buf) },
        TWrite => FCall::TWrite {
            fid: decode!(buf),
            offset: decode!(buf),
            data: decode!(buf),
        },
        RWrite => FCall::RWrite {
            count: decode!(buf),
        },
        TClunk => FCall::TClunk { fid: decode!(buf) },
        RClunk => FCall::RClunk,
        TStat => FCall::TStat { fid: decode!(buf) },
        RStat => {
            let _nstat: u16 = decode!(buf);
            FCall::RStat { stat: decode!(buf) }
        }
        TlError | TError => return res!(io_err!(InvalidData, "Invalid message type")),
    };

    Ok(body)
}

/// Decode the packed stat records returned by reading a directory
/// on a 9P2000 or 9P2000.u session.
pub fn decode_stats(data: &[u8]) -> Result<Vec<p92000::Stat>> {
    let mut r = Cursor::new(data);
    let mut stats = Vec::new();
    while (r.position() as usize) < data.len() {
        stats.push(Decodable::decode(&mut r)?);
    }
    Ok(stats)
}

#[test]
fn encoder_test1() {
    let expected: Vec<u8> = (0..10).collect();
    let mut encoder = Vec::new();
    for i in 0..10 {
        (&(i as u8)).encode(&mut encoder).unwrap();
    }
    assert_eq!(expected, encoder);
}

#[test]
fn decoder_test1() {
    let expected: Vec<u8> = (0..10).collect();
    let mut decoder = Cursor::new(expected.clone());
    let mut actual: Vec<u8> = Vec::new();
    loop {
        match Decodable::decode(&mut decoder) {
            Ok(i) => actual.push(i),
            Err(_) => break,
        }
    }
    assert_eq!(expected, actual);
}

#[test]
fn string_layout() {
    let mut buf = Vec::new();
    let n = "9P2000.L".to_owned().encode(&mut buf).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf[..2], &[8, 0]);
    assert_eq!(&buf[2..], b"9P2000.L");
}

#[test]
fn data_layout() {
    let mut buf = Vec::new();
    Data(vec![0xaa, 0xbb, 0xcc]).encode(&mut buf).unwrap();
    assert_eq!(buf, vec![3, 0, 0, 0, 0xaa, 0xbb, 0xcc]);
}

#[test]
fn short_string_fails() {
    // declares five bytes but carries two
    let mut r = Cursor::new(vec![5u8, 0, b'a', b'b']);
    let e = <String as Decodable>::decode(&mut r).unwrap_err();
    assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn readdir_records_until_exhausted() {
    let entries = DirEntryData::with(vec![
        DirEntry {
            qid: QId {
                typ: QIdType::DIR,
                version: 0,
                path: 1,
            },
            offset: 1,
            typ: 4,
            name: ".".to_owned(),
        },
        DirEntry {
            qid: QId {
                typ: QIdType::FILE,
                version: 3,
                path: 42,
            },
            offset: 2,
            typ: 8,
            name: "hello.txt".to_owned(),
        },
    ]);
    let mut buf = Vec::new();
    entries.encode(&mut buf).unwrap();
    assert_eq!(buf.len() as u32, 4 + entries.size());

    let decoded: DirEntryData = Decodable::decode(&mut Cursor::new(buf)).unwrap();
    assert_eq!(decoded, entries);
}

#[test]
fn stat_skips_unix_extensions() {
    let stat = p92000::Stat {
        qid: QId {
            typ: QIdType::FILE,
            version: 1,
            path: 7,
        },
        mode: 0o644,
        length: 10,
        name: "a".to_owned(),
        uid: "glenda".to_owned(),
        ..Default::default()
    };
    let mut buf = Vec::new();
    stat.encode(&mut buf).unwrap();
    // grow the record by a 9P2000.u extension string and three ids
    let extra: Vec<u8> = vec![0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0];
    let size = stat.size().unwrap() + extra.len() as u16;
    buf[..2].copy_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&extra);
    let copy = buf.clone();
    buf.extend_from_slice(&copy);

    let stats = decode_stats(&buf).unwrap();
    assert_eq!(stats, vec![stat.clone(), stat]);
}

#[test]
fn oversized_stat_is_rejected() {
    let stat = p92000::Stat {
        name: "x".repeat(u16::MAX as usize),
        ..Default::default()
    };
    assert_eq!(stat.size(), None);
    assert!(stat.encode(&mut Vec::new()).is_err());
    assert!(encode_body(&mut Vec::new(), &FCall::RStat { stat }, Dialect::Baseline).is_err());
}

#[test]
fn declared_length_beyond_body_fails() {
    // Rread count of 4 GiB - 1 followed by three bytes
    let body = [0xff, 0xff, 0xff, 0xff, 1, 2, 3];
    let err = decode_body(&mut Cursor::new(&body[..]), MsgType::RRead, Dialect::DotL).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

    let short_string = [10, 0, b'a', b'b'];
    assert!(<String as Decodable>::decode(&mut Cursor::new(&short_string[..])).is_err());
}
