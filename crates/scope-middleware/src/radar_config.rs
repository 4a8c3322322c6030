//! Radar control-plane setup.
//!
//! The radar's chirp profile is loaded by writing a text file of CLI
//! commands, one per line, to its control port. The sensor answers each
//! command with a prompt containing `Done`. A command that is never
//! acknowledged is logged and skipped; the upload carries on.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Reads attempted per command while waiting for the acknowledgement.
pub const ACK_READ_ATTEMPTS: usize = 5;
/// Bytes of reply inspected per command.
pub const ACK_BUFFER_LEN: usize = 250;
const ACK: &[u8] = b"Done";

#[derive(Debug, Error)]
pub enum RadarConfigError {
    #[error("failed to read radar config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("radar control port I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadReport {
    pub sent: usize,
    pub acknowledged: usize,
}

/// Load the command list from a `.cfg` file.
pub fn read_commands(path: &Path) -> Result<Vec<String>, RadarConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| RadarConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.lines().map(str::to_string).collect())
}

/// Send every command, `\r`-terminated, and wait for each acknowledgement.
pub fn upload_commands<P: Read + Write>(
    port: &mut P,
    commands: &[String],
) -> Result<UploadReport, RadarConfigError> {
    let mut report = UploadReport::default();
    for command in commands {
        debug!(%command, "Applying radar command");
        port.write_all(command.as_bytes())?;
        port.write_all(b"\r")?;
        port.flush()?;
        report.sent += 1;
        if wait_for_ack(port)? {
            report.acknowledged += 1;
        } else {
            warn!(%command, "Radar did not acknowledge command");
        }
    }
    info!(sent = report.sent, acknowledged = report.acknowledged, "Radar configured");
    Ok(report)
}

fn wait_for_ack<R: Read>(port: &mut R) -> io::Result<bool> {
    let mut reply = [0u8; ACK_BUFFER_LEN];
    let mut filled = 0;
    for _ in 0..ACK_READ_ATTEMPTS {
        if filled == reply.len() {
            break;
        }
        filled += port.read(&mut reply[filled..])?;
        if reply[..filled].windows(ACK.len()).any(|w| w == ACK) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::error::Error;

    /// Control port that replays canned replies, one per read.
    #[derive(Default)]
    struct ControlPort {
        written: Vec<u8>,
        replies: VecDeque<&'static [u8]>,
    }

    impl Read for ControlPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(reply) = self.replies.pop_front() else { return Ok(0) };
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    impl Write for ControlPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commands_are_carriage_return_terminated() -> Result<(), Box<dyn Error>> {
        let mut port = ControlPort::default();
        port.replies.extend([b"sensorStop\nDo".as_slice(), b"ne\nmmwDemo:/>", b"Done"]);
        let commands = vec!["sensorStop".to_string(), "flushCfg".to_string()];

        let report = upload_commands(&mut port, &commands)?;
        assert_eq!(report, UploadReport { sent: 2, acknowledged: 2 });
        assert_eq!(port.written, b"sensorStop\rflushCfg\r");
        Ok(())
    }

    #[test]
    fn silent_radar_is_reported_not_fatal() -> Result<(), Box<dyn Error>> {
        let mut port = ControlPort::default();
        let commands = vec!["sensorStart".to_string()];
        let report = upload_commands(&mut port, &commands)?;
        assert_eq!(report, UploadReport { sent: 1, acknowledged: 0 });
        Ok(())
    }

    #[test]
    fn reads_command_lines_from_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("profile.cfg");
        fs::write(&path, "% comment\nsensorStop\nsensorStart\n")?;
        assert_eq!(read_commands(&path)?, ["% comment", "sensorStop", "sensorStart"]);

        let missing = read_commands(&dir.path().join("missing.cfg"));
        assert!(matches!(missing, Err(RadarConfigError::Read { .. })));
        Ok(())
    }
}
