// A handle on one trie file.
//
// The handle owns a single stream. A lookup is a chain of seek-then-read steps
// over that one cursor, so the whole lookup (cache check, traversal, cache
// fill) runs under one mutex. Callers that need parallel lookups should open
// one handle per thread.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, trace, warn};

use crate::{
    codec::{check_node, read_node, read_node_header, read_value, write_node},
    encoding::{encode_char, FieldReader, FieldWriter},
    error::{Error, Result},
    fs::{OpenMode, TrieStream},
    layout,
    options::Options,
    trie::{hash_key, HashMode, Trie},
};

#[derive(Debug)]
struct Inner<S> {
    // None once closed.
    stream: Option<S>,
    // Hashed key -> value; None records a known miss.
    cache: HashMap<String, Option<Vec<u8>>>,
}

#[derive(Debug)]
pub struct TrieFile<S: TrieStream = File> {
    options: Options,
    inner: Mutex<Inner<S>>,
}

impl TrieFile<File> {
    /// Opens `path` with an fopen-style `mode`, which must include `b`.
    pub fn open<P: AsRef<Path>>(path: P, mode: &str, hash_mode: HashMode) -> Result<Self> {
        Self::open_with_options(path, mode, Options::with_hash_mode(hash_mode))
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        mode: &str,
        options: Options,
    ) -> Result<Self> {
        let open_mode = OpenMode::parse(mode)?;
        let file = open_mode.open(path.as_ref())?;
        debug!(
            path = %path.as_ref().display(),
            mode,
            hash_mode = %options.hash_mode,
            "opened trie file"
        );
        Ok(Self::from_stream(file, options))
    }

    /// Opens the file, hands it to `f`, and closes it again whether or not
    /// `f` succeeded. The returned handle is closed.
    pub fn open_with<P, F>(path: P, mode: &str, hash_mode: HashMode, f: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: FnOnce(&Self) -> Result<()>,
    {
        let file = Self::open(path, mode, hash_mode)?;
        let result = f(&file);
        file.close();
        result.map(|()| file)
    }

    /// Decodes a whole trie file into memory.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Trie> {
        Self::read_with_mode(path, HashMode::None)
    }

    /// Like `read`, but the returned trie hashes keys with `hash_mode` on
    /// lookup. Stored keys are used as they are on disk either way.
    pub fn read_with_mode<P: AsRef<Path>>(path: P, hash_mode: HashMode) -> Result<Trie> {
        let file = File::open(path.as_ref())?;
        let trie = decode(BufReader::new(file), hash_mode)?;
        debug!(path = %path.as_ref().display(), values = trie.len(), "read trie file");
        Ok(trie)
    }
}

impl<S: TrieStream> TrieFile<S> {
    pub fn from_stream(stream: S, options: Options) -> Self {
        TrieFile {
            options,
            inner: Mutex::new(Inner {
                stream: Some(stream),
                cache: HashMap::new(),
            }),
        }
    }

    pub fn hash_mode(&self) -> HashMode {
        self.options.hash_mode
    }

    pub fn options(&self) -> Options {
        self.options
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        // Nothing a panicking holder could leave half-done matters: the
        // stream is re-seeked by every user and the cache only gains complete
        // entries.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().stream.is_none()
    }

    /// Drops the stream. Closing twice is a no-op.
    pub fn close(&self) {
        if self.lock().stream.take().is_some() {
            debug!("closed trie file");
        }
    }

    /// Lays out `trie` and writes it from the start of the stream. Node
    /// offsets inside `trie` are updated in place.
    ///
    /// A trie with a field too wide for the format is rejected before the
    /// stream is touched, leaving the file and the cache as they were. Once
    /// writing starts the cache is dropped, so an I/O failure partway through
    /// never leaves lookups answering from the old contents.
    pub fn write_trie(&self, trie: &mut Trie) -> Result<()> {
        let mut inner = self.lock();
        let Inner { stream, cache } = &mut *inner;
        let stream = stream.as_mut().ok_or(Error::StreamClosed)?;

        if trie.hash_mode() != self.options.hash_mode {
            warn!(
                trie = %trie.hash_mode(),
                handle = %self.options.hash_mode,
                "writing a trie whose hash mode differs from this handle; lookups through it will miss"
            );
        }

        let size = layout::plan(trie);
        check_node(trie.root())?;

        cache.clear();
        stream.seek(SeekFrom::Start(0))?;
        {
            let mut w = FieldWriter::new(BufWriter::new(&mut *stream));
            write_node(trie.root(), &mut w)?;
            w.flush()?;
            debug_assert_eq!(w.position(), size);
        }
        stream.sync()?;

        debug!(bytes = size, values = trie.len(), "wrote trie file");
        Ok(())
    }

    /// Looks `key` up by walking the file from the root, one record per
    /// character. A zero-length value on disk reads as `None`.
    pub fn find(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.lock();
        let Inner { stream, cache } = &mut *inner;
        let stream = stream.as_mut().ok_or(Error::StreamClosed)?;

        let key = hash_key(key, self.options.hash_mode);
        if self.options.cache {
            if let Some(hit) = cache.get(key.as_ref()) {
                trace!(key = %key, found = hit.is_some(), "cache hit");
                return Ok(hit.clone());
            }
        }

        trace!(key = %key, "cache miss");
        let value = traverse(stream, &key)?;
        if self.options.cache {
            cache.insert(key.into_owned(), value.clone());
        }
        Ok(value)
    }

    /// Decodes the whole file through this handle.
    pub fn load(&self) -> Result<Trie> {
        let mut inner = self.lock();
        let stream = inner.stream.as_mut().ok_or(Error::StreamClosed)?;
        stream.seek(SeekFrom::Start(0))?;
        decode(stream, self.options.hash_mode)
    }

    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }
}

fn decode<R: Read + Seek>(r: R, hash_mode: HashMode) -> Result<Trie> {
    let mut reader = FieldReader::new(r);
    let root = read_node(&mut reader)?;
    Ok(Trie::with_root(root, hash_mode))
}

fn traverse<R: Read + Seek>(stream: R, key: &str) -> Result<Option<Vec<u8>>> {
    let mut r = FieldReader::new(stream);
    r.seek(0)?;

    for ch in key.chars() {
        // A character too wide for the letter field can never have been
        // written, so it cannot match.
        let letter = match encode_char(ch) {
            Ok(letter) => letter,
            Err(_) => return Ok(None),
        };

        let header = read_node_header(&mut r)?;
        match header.children.iter().find(|c| c.letter == letter) {
            Some(child) => {
                trace!(letter = %ch, offset = child.offset, "descending");
                r.seek(child.offset)?;
            }
            None => return Ok(None),
        }
    }

    let value = read_value(&mut r)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

#[cfg(test)]
mod test {
    use std::{fmt::Write, sync::Arc, thread};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::TrieFile;
    use crate::{
        error::Error,
        fs::MockFile,
        node::Node,
        options::Options,
        trie::{HashMode, Trie},
    };

    fn foo_bar(mode: HashMode) -> Trie {
        let mut t = Trie::new(mode);
        t.insert("foo", "bar");
        t
    }

    fn dump(node: &Node, path: &mut String, out: &mut String) {
        if let Some(v) = node.value() {
            writeln!(out, "{}: {:?}", path, String::from_utf8_lossy(v)).unwrap();
        }
        for (ch, child) in node.children() {
            path.push(ch);
            dump(child, path, out);
            path.pop();
        }
    }

    #[test]
    fn test_file_trace() {
        datadriven::walk("src/file/testdata/", |f| {
            let mock = MockFile::new();
            let mut trie = Trie::new(HashMode::None);
            let mut file = TrieFile::from_stream(mock.clone(), Options::default());
            f.run(|test_case| match test_case.directive.as_str() {
                "insert" => {
                    if let Some(mode) = test_case.args.get("mode") {
                        trie = Trie::new(mode[0].parse().unwrap());
                    }
                    for line in test_case.input.lines() {
                        let (key, val) = line.split_once('=').unwrap();
                        trie.insert(key, val);
                    }
                    "ok\n".into()
                }
                "write" => {
                    file = TrieFile::from_stream(
                        mock.clone(),
                        Options::with_hash_mode(trie.hash_mode()),
                    );
                    match file.write_trie(&mut trie) {
                        Ok(()) => format!("wrote {} bytes\n", mock.len()),
                        Err(e) => format!("error: {}\n", e),
                    }
                }
                "bytes" => format!("{:?}\n", mock.read_all()),
                "open" => {
                    let mode: HashMode = test_case
                        .args
                        .get("mode")
                        .expect("open requires mode argument")[0]
                        .parse()
                        .unwrap();
                    file = TrieFile::from_stream(mock.clone(), Options::with_hash_mode(mode));
                    "ok\n".into()
                }
                "close" => {
                    file.close();
                    "ok\n".into()
                }
                "find" => {
                    let mut out = String::new();
                    for key in test_case.input.lines() {
                        match file.find(key) {
                            Ok(Some(v)) => {
                                writeln!(out, "{}: {:?}", key, String::from_utf8_lossy(&v))
                                    .unwrap()
                            }
                            Ok(None) => writeln!(out, "{}: not found", key).unwrap(),
                            Err(e) => writeln!(out, "{}: error: {}", key, e).unwrap(),
                        }
                    }
                    out
                }
                "read" => match file.load() {
                    Ok(t) => {
                        let mut out = String::new();
                        dump(t.root(), &mut String::new(), &mut out);
                        out
                    }
                    Err(e) => format!("error: {}\n", e),
                },
                "trace" => {
                    let mut result = String::new();
                    for event in mock.take_events() {
                        event.write_abbrev(&mut result).unwrap();
                        result.push('\n');
                    }
                    if test_case.args.contains_key("squelch") {
                        "ok\n".into()
                    } else if result.is_empty() {
                        "no events\n".into()
                    } else {
                        result
                    }
                }
                _ => {
                    panic!("unhandled");
                }
            })
        })
    }

    #[test]
    fn test_open_rejects_text_mode() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.trie");
        match TrieFile::open(&path, "w", HashMode::None) {
            Err(Error::NotOpenedInBinaryMode(mode)) => assert_eq!(mode, "w"),
            other => panic!("expected binary mode error, got {:?}", other),
        }
        // Rejected before touching the filesystem.
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_open_with_closes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.trie");

        let f = TrieFile::open_with(&path, "wb", HashMode::None, |f| {
            assert!(!f.is_closed());
            f.write_trie(&mut foo_bar(HashMode::None))
        })?;
        assert!(f.is_closed());
        assert!(matches!(f.find("foo"), Err(Error::StreamClosed)));
        assert!(matches!(
            f.write_trie(&mut foo_bar(HashMode::None)),
            Err(Error::StreamClosed)
        ));

        let f = TrieFile::open(&path, "rb", HashMode::None)?;
        assert!(!f.is_closed());
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        f.close();
        f.close();
        assert!(f.is_closed());
        Ok(())
    }

    #[test]
    fn test_read_and_find_agree() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for mode in [HashMode::None, HashMode::Md5, HashMode::Sha1] {
            let path = dir.path().join(format!("{}.trie", mode));
            let mut rng = StdRng::seed_from_u64(7);
            let mut trie = Trie::new(mode);
            let mut keys = Vec::new();
            for i in 0..200 {
                let len = rng.gen_range(1..10);
                let key: String = (0..len)
                    .map(|_| ['a', 'b', 'c', '\u{e9}', '\u{4e2d}'][rng.gen_range(0..5)])
                    .collect();
                trie.insert(&key, format!("value{}", i));
                keys.push(key);
            }

            TrieFile::open_with(&path, "wb", mode, |f| f.write_trie(&mut trie))?;

            let f = TrieFile::open(&path, "rb", mode)?;
            let decoded = TrieFile::read_with_mode(&path, mode)?;
            assert_eq!(decoded, trie);
            for key in &keys {
                let expected = trie.lookup(key).map(|v| v.to_vec());
                assert!(expected.is_some());
                assert_eq!(f.find(key)?, expected, "{} {:?}", mode, key);
                assert_eq!(decoded.lookup(key).map(|v| v.to_vec()), expected);
            }
            for missing in ["zzz", "", "a\u{1f600}"] {
                assert_eq!(f.find(missing)?, None);
                assert_eq!(decoded.lookup(missing), None);
            }
        }
        Ok(())
    }

    #[test]
    fn test_read_unhashed_keeps_stored_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("md5.trie");
        TrieFile::open_with(&path, "wb", HashMode::Md5, |f| {
            f.write_trie(&mut foo_bar(HashMode::Md5))
        })?;

        let t = TrieFile::read(&path)?;
        assert_eq!(t.lookup("foo"), None);
        assert_eq!(
            t.lookup("acbd18db4cc2f85cedef654fccc4a4d8"),
            Some(&b"bar"[..])
        );
        Ok(())
    }

    #[test]
    fn test_cache_skips_stream() -> anyhow::Result<()> {
        let mock = MockFile::new();
        let f = TrieFile::from_stream(mock.clone(), Options::default());
        f.write_trie(&mut foo_bar(HashMode::None))?;
        mock.take_events();

        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        assert!(mock.take_events().iter().any(|e| e.is_read()));
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        assert!(mock.take_events().is_empty());

        // Misses are cached too.
        assert_eq!(f.find("nope")?, None);
        assert!(!mock.take_events().is_empty());
        assert_eq!(f.find("nope")?, None);
        assert!(mock.take_events().is_empty());
        assert_eq!(f.cache_len(), 2);
        Ok(())
    }

    #[test]
    fn test_cache_disabled() -> anyhow::Result<()> {
        let mock = MockFile::new();
        let f = TrieFile::from_stream(
            mock.clone(),
            Options {
                hash_mode: HashMode::None,
                cache: false,
            },
        );
        f.write_trie(&mut foo_bar(HashMode::None))?;
        mock.take_events();

        for _ in 0..2 {
            assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
            assert!(mock.take_events().iter().any(|e| e.is_read()));
        }
        assert_eq!(f.cache_len(), 0);
        Ok(())
    }

    #[test]
    fn test_rewrite_clears_cache() -> anyhow::Result<()> {
        let mock = MockFile::new();
        let f = TrieFile::from_stream(mock, Options::default());
        f.write_trie(&mut foo_bar(HashMode::None))?;
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));

        let mut t = Trie::new(HashMode::None);
        t.insert("foo", "qux");
        f.write_trie(&mut t)?;
        assert_eq!(f.cache_len(), 0);
        assert_eq!(f.find("foo")?, Some(b"qux".to_vec()));
        Ok(())
    }

    #[test]
    fn test_write_failure_surfaces() {
        let mock = MockFile::new();
        mock.schedule_crash(0);
        let f = TrieFile::from_stream(mock, Options::default());
        assert!(matches!(
            f.write_trie(&mut foo_bar(HashMode::None)),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_rejected_write_leaves_file() -> anyhow::Result<()> {
        let mock = MockFile::new();
        let f = TrieFile::from_stream(mock.clone(), Options::default());
        let mut t = Trie::new(HashMode::None);
        t.insert("foo", "bar");
        t.insert("zed", "baz");
        f.write_trie(&mut t)?;
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        let before = mock.read_all();
        mock.take_events();

        let mut big = Trie::new(HashMode::None);
        big.insert("a", vec![0_u8; 65536]);
        assert!(matches!(
            f.write_trie(&mut big),
            Err(Error::FieldOverflow {
                field: "value length",
                ..
            })
        ));
        let mut wide = Trie::new(HashMode::None);
        wide.insert("\u{1f600}", "x");
        assert!(matches!(
            f.write_trie(&mut wide),
            Err(Error::CharacterFieldOverflow { .. })
        ));

        assert!(mock.take_events().is_empty());
        assert_eq!(mock.read_all(), before);
        assert_eq!(f.cache_len(), 1);
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        assert_eq!(f.find("zed")?, Some(b"baz".to_vec()));
        Ok(())
    }

    #[test]
    fn test_failed_write_clears_cache() -> anyhow::Result<()> {
        let mock = MockFile::new();
        let f = TrieFile::from_stream(mock.clone(), Options::default());
        f.write_trie(&mut foo_bar(HashMode::None))?;
        assert_eq!(f.find("foo")?, Some(b"bar".to_vec()));
        assert_eq!(f.cache_len(), 1);

        mock.schedule_crash(0);
        assert!(matches!(
            f.write_trie(&mut foo_bar(HashMode::None)),
            Err(Error::Io(_))
        ));
        assert_eq!(f.cache_len(), 0);
        Ok(())
    }

    #[test]
    fn test_deep_key() -> anyhow::Result<()> {
        let key = "k".repeat(10_000);
        let mock = MockFile::new();
        let f = TrieFile::from_stream(mock.clone(), Options::default());
        let mut t = Trie::new(HashMode::None);
        t.insert(&key, "deep");
        t.insert("k", "shallow");
        f.write_trie(&mut t)?;
        // Ten thousand one-child records, "shallow" at depth one, the leaf.
        assert_eq!(mock.len(), 10_000 * 10 + 7 + 8);

        assert_eq!(f.find(&key)?, Some(b"deep".to_vec()));
        assert_eq!(f.find(&key[1..])?, None);
        let loaded = f.load()?;
        assert_eq!(loaded.lookup(&key), Some(&b"deep"[..]));
        assert_eq!(loaded.lookup("k"), Some(&b"shallow"[..]));
        assert_eq!(loaded.len(), 2);
        Ok(())
    }

    #[test]
    fn test_truncated_file() {
        let mock = MockFile::with_contents(vec![0, 0, 0, 1, 0, 0, 102, 0, 0, 10, 0]);
        let f = TrieFile::from_stream(mock, Options::default());
        assert!(matches!(
            f.find("foo"),
            Err(Error::MalformedRecord { offset: 10, .. })
        ));
        assert!(matches!(f.load(), Err(Error::MalformedRecord { .. })));
        // Errors are not cached.
        assert_eq!(f.cache_len(), 0);
    }

    #[test]
    fn test_concurrent_finds() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shared.trie");

        let mut trie = Trie::new(HashMode::Sha1);
        for i in 0..500 {
            trie.insert(&format!("key{}", i), format!("value{}", i));
        }
        TrieFile::open_with(&path, "wb", HashMode::Sha1, |f| f.write_trie(&mut trie))?;

        let f = Arc::new(TrieFile::open(&path, "rb", HashMode::Sha1)?);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let f = Arc::clone(&f);
                thread::spawn(move || {
                    for i in (t..500).step_by(3) {
                        let got = f.find(&format!("key{}", i)).unwrap();
                        assert_eq!(got, Some(format!("value{}", i).into_bytes()));
                    }
                    assert_eq!(f.find("absent").unwrap(), None);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(f.cache_len(), 501);
        Ok(())
    }
}
