use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::{fs, io::AsyncWriteExt};

use crate::constants::FILE_TIMESTAMP_FORMAT;
use crate::error::{Error, Result};
use crate::report::trailer_rows;
use crate::results::ProbeResult;

const ILLEGAL_FILE_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Creates the log directory if needed.
///
/// # Errors
/// [`Error::Config`] when the directory cannot be created.
pub async fn prepare_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await.map_err(|err| {
        Error::Config(format!(
            "cannot create log directory {}: {}",
            dir.display(),
            err
        ))
    })
}

/// `ping_<label>_<timestamp>.csv` with characters that are illegal in file names removed.
pub fn file_name(label: &str, now: &DateTime<Local>) -> String {
    let raw = format!("ping_{}_{}", label, now.format(FILE_TIMESTAMP_FORMAT));
    let name: String = raw
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_FILE_NAME_CHARS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}.csv", name)
}

/// Semicolon separated log of one destination.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: fs::File,
}

impl LogSink {
    /// Creates the log file and writes its header row.
    pub async fn open(
        dir: &Path,
        destination: &str,
        label: &str,
        payload_size: usize,
        now: &DateTime<Local>,
    ) -> Result<Self> {
        prepare_dir(dir).await?;
        let path = dir.join(file_name(label, now));
        let file = fs::File::create(&path).await.map_err(|err| {
            Error::Config(format!("cannot create log file {}: {}", path.display(), err))
        })?;
        let mut sink = Self { path, file };
        sink.append(&format!("Date;{};Bytes [{}];Time;TTL", destination, payload_size))
            .await?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, row: &str) -> Result<()> {
        let mut line = String::with_capacity(row.len() + 1);
        line.push_str(row);
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|err| {
                Error::transport(format!("failed to write {}", self.path.display()), err)
            })?;
        self.file.flush().await.map_err(|err| {
            Error::transport(format!("failed to flush {}", self.path.display()), err)
        })
    }

    pub async fn finish(mut self, result: &ProbeResult) -> Result<()> {
        for row in trailer_rows(result) {
            self.append(&row).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Counters;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pinglog-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_file_name_strips_illegal_characters() {
        assert_eq!(
            file_name("fe80::1", &now()),
            "ping_fe801_2024-03-09_14.05.07.csv"
        );
        assert_eq!(
            file_name("my host", &now()),
            "ping_my_host_2024-03-09_14.05.07.csv"
        );
    }

    #[tokio::test]
    async fn test_log_file_layout() {
        let dir = scratch_dir("layout").join("nested");
        let mut sink = LogSink::open(&dir, "localhost", "127.0.0.1", 32, &now())
            .await
            .unwrap();
        sink.append("2024-03-09 14:05:07;Reply from 127.0.0.1 received;32;1;64")
            .await
            .unwrap();
        let path = sink.path().to_path_buf();
        let result = ProbeResult {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            counters: Counters {
                sent: 1,
                received: 1,
                lost: 0,
            },
            samples: vec![1],
        };
        sink.finish(&result).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Date;localhost;Bytes [32];Time;TTL");
        assert_eq!(lines[1], "2024-03-09 14:05:07;Reply from 127.0.0.1 received;32;1;64");
        assert_eq!(&lines[2..5], ["Sent;1", "Received;1", "Lost;0"]);
        assert_eq!(lines[8], "Average Time;1");
        std::fs::remove_dir_all(scratch_dir("layout")).unwrap();
    }

    #[tokio::test]
    async fn test_unusable_dir_is_a_config_error() {
        let blocker = scratch_dir("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let result = prepare_dir(&blocker.join("logs")).await;
        assert!(matches!(result, Err(Error::Config(_))));
        std::fs::remove_file(&blocker).unwrap();
    }
}
