use std::{
    cell::RefCell,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, Write},
    path::Path,
    rc::Rc,
};

use crate::error::{Error, Result};

/// The byte stream a trie file lives on.
pub trait TrieStream: std::fmt::Debug + Read + Seek + Write {
    fn sync(&mut self) -> io::Result<()>;
}

impl TrieStream for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// An fopen-style mode string: `r` or `w`, optionally `+`, and `b`.
///
/// Text mode is refused. Append mode is refused too: records hold absolute
/// offsets from the start of the file, so the trie must be written from byte
/// 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub truncate: bool,
    pub create: bool,
}

impl OpenMode {
    pub fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let mut parsed = match chars.next() {
            Some('r') => OpenMode {
                read: true,
                write: false,
                truncate: false,
                create: false,
            },
            Some('w') => OpenMode {
                read: false,
                write: true,
                truncate: true,
                create: true,
            },
            _ => return Err(Error::InvalidMode(mode.to_owned())),
        };

        let (mut plus, mut binary, mut text) = (false, false, false);
        for ch in chars {
            let seen = match ch {
                '+' => &mut plus,
                'b' => &mut binary,
                't' => &mut text,
                _ => return Err(Error::InvalidMode(mode.to_owned())),
            };
            if *seen {
                return Err(Error::InvalidMode(mode.to_owned()));
            }
            *seen = true;
        }

        if binary && text {
            return Err(Error::InvalidMode(mode.to_owned()));
        }
        if !binary {
            return Err(Error::NotOpenedInBinaryMode(mode.to_owned()));
        }
        if plus {
            parsed.read = true;
            parsed.write = true;
        }
        Ok(parsed)
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<File> {
        let file = OpenOptions::new()
            .read(self.read)
            .write(self.write)
            .truncate(self.truncate)
            .create(self.create)
            .open(path)?;
        Ok(file)
    }
}

// Mock Implementation
#[derive(Default, Debug)]
struct MockData {
    synced: Vec<u8>,
    unsynced: Vec<u8>,
    events: Vec<Event>,

    // After this many writes or syncs, "crash": refuse further writes and
    // syncs.
    time_to_crash: Option<usize>,
}

impl MockData {
    fn perform_op(&mut self) -> io::Result<()> {
        match self.time_to_crash {
            Some(0) => Err(io::Error::new(io::ErrorKind::Other, "filesystem is down")),
            Some(x) => {
                self.time_to_crash = Some(x - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// In-memory stream that records every operation. Clones share contents and
/// the event log, so a test can keep one clone and hand the other to a
/// `TrieFile`.
#[derive(Clone, Debug, Default)]
pub struct MockFile {
    idx: u64,
    data: Rc<RefCell<MockData>>,
}

impl MockFile {
    pub fn new() -> Self {
        MockFile::default()
    }

    pub fn with_contents(contents: Vec<u8>) -> Self {
        let file = MockFile::new();
        {
            let mut data = file.data.borrow_mut();
            data.synced = contents.clone();
            data.unsynced = contents;
        }
        file
    }

    pub fn read_all(&self) -> Vec<u8> {
        self.data.borrow().unsynced.clone()
    }

    pub fn read_all_synced(&self) -> Vec<u8> {
        self.data.borrow().synced.clone()
    }

    pub fn len(&self) -> usize {
        self.data.borrow().unsynced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn schedule_crash(&self, ops: usize) {
        self.data.borrow_mut().time_to_crash = Some(ops);
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.data.borrow_mut().events)
    }

    fn record(&self, e: Event) {
        self.data.borrow_mut().events.push(e);
    }
}

impl Seek for MockFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let len = self.len() as i64;
        let target = match pos {
            io::SeekFrom::Start(i) => i as i64,
            io::SeekFrom::End(i) => len + i,
            io::SeekFrom::Current(i) => self.idx as i64 + i,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.idx = target as u64;
        self.record(Event::Seek(self.idx));
        Ok(self.idx)
    }
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let data = self.data.borrow();
            let start = std::cmp::min(self.idx as usize, data.unsynced.len());
            let n = std::cmp::min(data.unsynced.len() - start, buf.len());
            buf[..n].copy_from_slice(&data.unsynced[start..start + n]);
            n
        };
        self.record(Event::Read(self.idx, n));
        self.idx += n as u64;
        Ok(n)
    }
}

impl Write for MockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let mut data = self.data.borrow_mut();
            data.perform_op()?;
            let idx = self.idx as usize;
            if data.unsynced.len() < idx + buf.len() {
                data.unsynced.resize(idx + buf.len(), 0);
            }
            data.unsynced[idx..idx + buf.len()].copy_from_slice(buf);
        }
        self.record(Event::Write(self.idx, buf.to_vec()));
        self.idx += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TrieStream for MockFile {
    fn sync(&mut self) -> io::Result<()> {
        let mut data = self.data.borrow_mut();
        data.perform_op()?;
        let unsynced = data.unsynced.clone();
        data.synced = unsynced;
        data.events.push(Event::Sync);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Seek(u64),
    Read(u64, usize),
    Write(u64, Vec<u8>),
    Sync,
}

impl Event {
    pub fn is_read(&self) -> bool {
        matches!(self, Event::Read(..))
    }

    pub fn write_abbrev<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        match self {
            Event::Seek(idx) => write!(w, "Seek({})", idx),
            Event::Read(idx, n) => write!(w, "Read({}, {})", idx, n),
            Event::Write(idx, contents) => write!(w, "Write({}, {:?})", idx, contents),
            Event::Sync => write!(w, "Sync"),
        }
    }
}
