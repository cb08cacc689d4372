//! Hosts file storage.
//!
//! The hosts file is opened once for reading and writing and kept open for
//! the whole run. It is read once at startup, after which it is only ever
//! appended to. Other processes may read (and edit) the file in between, so
//! every append first makes sure the file ends with a newline.

use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StoreError;

/// One `<address> <hostname>` line of the hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub hostname: String,
    pub address: Ipv4Addr,
}

impl HostRecord {
    pub fn new(hostname: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            hostname: hostname.into(),
            address,
        }
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t{}\t{}", self.address, self.hostname)
    }
}

/// Whether `hostname` can be written as the second field of a hosts line.
///
/// Only non-empty names of printable, non-whitespace ASCII are accepted, so a
/// record always reads back as exactly two fields on one line.
pub fn is_valid_hostname(hostname: &str) -> bool {
    !hostname.is_empty() && hostname.bytes().all(|byte| byte.is_ascii_graphic())
}

/// Trait for the persistent side of resolved records.
pub trait RecordStore: Send + 'static {
    /// Durably append one record.
    fn append(&mut self, record: &HostRecord) -> Result<(), StoreError>;
}

/// Extract the hostname of a hosts line.
///
/// Comment lines and lines that are not exactly `<address> <hostname>` are
/// ignored. The address field is not validated.
pub fn parse_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        return None;
    }

    let mut fields = trimmed.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(_address), Some(hostname), None) => Some(hostname),
        _ => None,
    }
}

/// Collect the hostnames of every well-formed line.
///
/// Bytes that are not valid UTF-8 are replaced, never rejected.
pub fn parse_hosts(reader: &mut dyn BufRead) -> io::Result<HashSet<String>> {
    let mut hosts = HashSet::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let bytes_read = reader.read_until(b'\n', &mut buf)?;
        if bytes_read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if let Some(hostname) = parse_line(&line) {
            hosts.insert(hostname.to_string());
        }
    }

    Ok(hosts)
}

/// Long-lived read/write handle on a hosts file.
#[derive(Debug)]
pub struct HostsFile {
    path: PathBuf,
    file: File,
}

impl HostsFile {
    /// Open an existing hosts file for reading and appending.
    ///
    /// On Windows the file is opened with read-only sharing so other
    /// processes can still read it while it is held.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            // FILE_SHARE_READ
            options.share_mode(0x0000_0001);
        }

        let file = options.open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the hostnames currently present in the file.
    pub fn load(&mut self) -> Result<HashSet<String>, StoreError> {
        let read_error = |source| StoreError::Read {
            path: self.path.clone(),
            source,
        };

        self.file.seek(SeekFrom::Start(0)).map_err(read_error)?;
        let mut reader = BufReader::new(&self.file);
        parse_hosts(&mut reader).map_err(read_error)
    }

    fn write_record(&mut self, record: &HostRecord) -> io::Result<()> {
        let len = self.file.seek(SeekFrom::End(0))?;
        if len > 0 {
            self.file.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            self.file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                self.file.seek(SeekFrom::End(0))?;
                self.file.write_all(b"\n")?;
            }
        }

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(record.to_string().as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

impl RecordStore for HostsFile {
    fn append(&mut self, record: &HostRecord) -> Result<(), StoreError> {
        if !is_valid_hostname(&record.hostname) {
            return Err(StoreError::InvalidHostname {
                hostname: record.hostname.clone(),
            });
        }

        self.write_record(record)
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, host = %record.hostname, "appended hosts record");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    /// Store that fails every append.
    #[derive(Debug, Default)]
    pub struct FailingStore {
        pub attempts: usize,
    }

    impl RecordStore for FailingStore {
        fn append(&mut self, _record: &HostRecord) -> Result<(), StoreError> {
            self.attempts += 1;
            Err(StoreError::Write {
                path: PathBuf::from("/nonexistent/hosts"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    fn hosts_file_with(content: &str) -> (NamedTempFile, HostsFile) {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(content.as_bytes()).unwrap();
        temp.flush().unwrap();
        let hosts = HostsFile::open(temp.path()).unwrap();
        (temp, hosts)
    }

    fn record() -> HostRecord {
        HostRecord::new("example.com", Ipv4Addr::new(93, 184, 216, 34))
    }

    #[test]
    fn test_record_line_format() {
        assert_eq!(record().to_string(), "\t93.184.216.34\texample.com\n");
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("127.0.0.1 localhost"), Some("localhost"));
        assert_eq!(parse_line("\t1.2.3.4\texample.com\r\n"), Some("example.com"));
        assert_eq!(parse_line("  10.0.0.1    spaced.local  "), Some("spaced.local"));
        assert_eq!(parse_line("# 127.0.0.1 commented"), None);
        assert_eq!(parse_line("   # indented comment"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("lonely"), None);
        assert_eq!(parse_line("::1 localhost ip6-localhost"), None);
        assert_eq!(parse_line("1.2.3.4 host # trailing comment"), None);
    }

    #[test]
    fn test_load_collects_hostnames() {
        let content = r"
# comment line
127.0.0.1 localhost
::1 localhost ip6-localhost ip6-loopback

	93.184.216.34	example.com
10.0.0.1 intranet.local
malformed
";
        let (_temp, mut hosts) = hosts_file_with(content);

        let known = hosts.load().unwrap();

        assert_eq!(known.len(), 3);
        assert!(known.contains("localhost"));
        assert!(known.contains("example.com"));
        assert!(known.contains("intranet.local"));
    }

    #[test]
    fn test_load_replaces_invalid_utf8() {
        let content: &[u8] = b"# caf\xe9 comment\n127.0.0.1 localhost\n10.0.0.2 caf\xe9.local\n";
        let (temp, mut hosts) = hosts_file_with("");
        std::fs::write(temp.path(), content).unwrap();

        let known = hosts.load().unwrap();

        assert_eq!(known.len(), 2);
        assert!(known.contains("localhost"));
        assert!(known.contains("caf\u{FFFD}.local"));
    }

    #[test]
    fn test_valid_hostname() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("xn--caf-dma.example"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("evil\n6.6.6.6 bank.com"));
        assert!(!is_valid_hostname("two words.com"));
        assert!(!is_valid_hostname("tab\there.com"));
        assert!(!is_valid_hostname("nul\0.com"));
        assert!(!is_valid_hostname("caf\u{e9}.com"));
    }

    #[test]
    fn test_append_rejects_hostname_breaking_the_line() {
        let (temp, mut hosts) = hosts_file_with("127.0.0.1 localhost\n");

        let result = hosts.append(&HostRecord::new(
            "evil\n6.6.6.6 bank.com",
            Ipv4Addr::new(1, 2, 3, 4),
        ));

        assert!(matches!(result, Err(StoreError::InvalidHostname { .. })));
        assert_eq!(
            std::fs::read_to_string(temp.path()).unwrap(),
            "127.0.0.1 localhost\n"
        );
    }

    #[test]
    fn test_load_empty_file() {
        let (_temp, mut hosts) = hosts_file_with("");
        assert!(hosts.load().unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HostsFile::open(dir.path().join("hosts"));
        assert!(matches!(result, Err(StoreError::Open { .. })));
    }

    #[test]
    fn test_append_to_empty_file() {
        let (temp, mut hosts) = hosts_file_with("");

        hosts.append(&record()).unwrap();

        let content = std::fs::read_to_string(temp.path()).unwrap();
        assert_eq!(content, "\t93.184.216.34\texample.com\n");
    }

    #[test]
    fn test_append_after_trailing_newline() {
        let (temp, mut hosts) = hosts_file_with("127.0.0.1 localhost\n");

        hosts.append(&record()).unwrap();

        let content = std::fs::read_to_string(temp.path()).unwrap();
        assert_eq!(
            content,
            "127.0.0.1 localhost\n\t93.184.216.34\texample.com\n"
        );
    }

    #[test]
    fn test_append_without_trailing_newline() {
        let (temp, mut hosts) = hosts_file_with("127.0.0.1 localhost");

        hosts.append(&record()).unwrap();

        let content = std::fs::read_to_string(temp.path()).unwrap();
        assert_eq!(
            content,
            "127.0.0.1 localhost\n\t93.184.216.34\texample.com\n"
        );
    }

    #[test]
    fn test_append_sees_external_edits() {
        let (mut temp, mut hosts) = hosts_file_with("127.0.0.1 localhost\n");
        hosts.append(&record()).unwrap();

        // another process appends without a trailing newline
        temp.as_file_mut().seek(SeekFrom::End(0)).unwrap();
        temp.write_all(b"10.0.0.1 edited.local").unwrap();
        temp.flush().unwrap();

        hosts
            .append(&HostRecord::new("second.com", Ipv4Addr::new(1, 2, 3, 4)))
            .unwrap();

        let content = std::fs::read_to_string(temp.path()).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(
            content,
            "127.0.0.1 localhost\n\t93.184.216.34\texample.com\n10.0.0.1 edited.local\n\t1.2.3.4\tsecond.com\n"
        );
    }

    #[test]
    fn test_appended_records_are_loaded_back() {
        let (_temp, mut hosts) = hosts_file_with("127.0.0.1 localhost");
        hosts.append(&record()).unwrap();

        let known = hosts.load().unwrap();

        assert!(known.contains("localhost"));
        assert!(known.contains("example.com"));
    }

    #[test]
    fn test_failing_store_reports_write_error() {
        let mut store = FailingStore::default();
        assert!(matches!(
            store.append(&record()),
            Err(StoreError::Write { .. })
        ));
        assert_eq!(store.attempts, 1);
    }
}
