//! NTRIP client: a single TCP socket per mountpoint, an HTTP/1.0-style GET
//! with Basic auth, and a nonblocking byte reader once streaming starts.
//! The request/response state machine follows RFC-draft NTRIP v1 directly,
//! since the retrieved reference sources have no request/response code of
//! their own to ground on; the socket/thread idiom — blocking reads with a
//! short timeout polled in a loop, `Arc<AtomicBool>` shutdown — follows the
//! same pattern `hub::Broadcast` and `CoreContext` use elsewhere in this
//! crate.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant as StdInstant};

use base64::Engine;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Authenticating,
    Streaming,
    Error,
}

pub struct NtripClient {
    host: String,
    port: u16,
    mountpoint: String,
    username: String,
    password: String,
    user_agent: String,
    gga_sentence: Option<String>,
    status: ConnectionStatus,
    stream: Option<TcpStream>,
    backoff: Duration,
    last_gga_sent: Option<StdInstant>,
}

const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const GGA_RESEND_INTERVAL: Duration = Duration::from_secs(60);

impl NtripClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        mountpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            mountpoint: mountpoint.into(),
            username: username.into(),
            password: password.into(),
            user_agent: user_agent.into(),
            gga_sentence: None,
            status: ConnectionStatus::Idle,
            stream: None,
            backoff: MIN_BACKOFF,
            last_gga_sent: None,
        }
    }

    pub fn with_gga(mut self, gga: impl Into<String>) -> Self {
        self.gga_sentence = Some(gga.into());
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    fn request(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        let auth = base64::engine::general_purpose::STANDARD.encode(credentials);
        let mut req = format!(
            "GET /{} HTTP/1.0\r\nUser-Agent: {}\r\nAuthorization: Basic {}\r\n",
            self.mountpoint, self.user_agent, auth
        );
        if let Some(gga) = &self.gga_sentence {
            req.push_str(&format!("Ntrip-GGA: {gga}\r\n"));
        }
        req.push_str("\r\n");
        req
    }

    /// Connects, sends the request, and reads the response header line(s)
    /// up to the blank line that terminates them. On success, transitions
    /// to `Streaming` and resets the backoff; on failure, transitions to
    /// `Error` with the corresponding [`CoreError`] and leaves the backoff
    /// for the caller to apply before retrying.
    pub fn connect(&mut self) -> Result<(), CoreError> {
        self.status = ConnectionStatus::Connecting;
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(Duration::from_secs(1)))?;

        self.status = ConnectionStatus::Authenticating;
        let mut writer = stream.try_clone()?;
        writer.write_all(self.request().as_bytes())?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut status_line = String::new();
        reader.read_line(&mut status_line)?;

        if !(status_line.starts_with("ICY 200")
            || status_line.starts_with("HTTP/1.0 200")
            || status_line.starts_with("HTTP/1.1 200"))
        {
            self.status = ConnectionStatus::Error;
            return Err(classify_status_line(&status_line));
        }

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 || line == "\r\n" || line == "\n" {
                break;
            }
        }

        self.stream = Some(stream);
        self.status = ConnectionStatus::Streaming;
        self.backoff = MIN_BACKOFF;
        self.last_gga_sent = Some(StdInstant::now());
        Ok(())
    }

    /// Reads whatever bytes are immediately available into `buf`, returning
    /// the count read. A read timeout (no data within the socket's 1s
    /// timeout) yields `Ok(0)` rather than an error, matching the
    /// nonblocking `read_chunk` contract.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(CoreError::SocketClosed);
        };
        match stream.read(buf) {
            Ok(0) => {
                self.status = ConnectionStatus::Error;
                Err(CoreError::SocketClosed)
            },
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(0)
            },
            Err(e) => {
                self.status = ConnectionStatus::Error;
                Err(CoreError::Io(e))
            },
        }
    }

    /// Resends the GGA sentence once `GGA_RESEND_INTERVAL` has elapsed,
    /// for VRS-style casters that require periodic position updates.
    pub fn maybe_resend_gga(&mut self) -> Result<(), CoreError> {
        let (Some(gga), Some(stream)) = (&self.gga_sentence, self.stream.as_mut()) else {
            return Ok(());
        };
        let due = self
            .last_gga_sent
            .map(|t| t.elapsed() >= GGA_RESEND_INTERVAL)
            .unwrap_or(true);
        if due {
            stream.write_all(format!("{gga}\r\n").as_bytes())?;
            self.last_gga_sent = Some(StdInstant::now());
        }
        Ok(())
    }

    /// Exponential backoff, doubling from 2s up to a 60s cap, reset by
    /// [`connect`]'s success path.
    pub fn next_backoff(&mut self) -> Duration {
        let current = self.backoff;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        current
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.status = ConnectionStatus::Idle;
    }
}

fn classify_status_line(line: &str) -> CoreError {
    if line.contains("404") || line.to_ascii_uppercase().contains("SOURCETABLE") {
        CoreError::MountPointNotFound
    } else if line.contains("401") || line.contains("403") {
        CoreError::AuthFailure
    } else {
        CoreError::CasterUnreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_template_includes_mountpoint_and_basic_auth() {
        let client = NtripClient::new("caster.example", 2101, "MOUNT1", "user", "pass", "ntrip-corr-core/0.1");
        let req = client.request();
        assert!(req.starts_with("GET /MOUNT1 HTTP/1.0\r\n"));
        assert!(req.contains("Authorization: Basic"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn gga_sentence_is_included_when_configured() {
        let client = NtripClient::new("caster.example", 2101, "MOUNT1", "user", "pass", "ua")
            .with_gga("$GPGGA,...");
        assert!(client.request().contains("Ntrip-GGA: $GPGGA"));
    }

    #[test]
    fn backoff_doubles_and_caps_at_sixty_seconds() {
        let mut client = NtripClient::new("caster.example", 2101, "M", "u", "p", "ua");
        assert_eq!(client.next_backoff(), Duration::from_secs(2));
        assert_eq!(client.next_backoff(), Duration::from_secs(4));
        assert_eq!(client.next_backoff(), Duration::from_secs(8));
        for _ in 0..10 {
            client.next_backoff();
        }
        assert_eq!(client.next_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn classifies_404_as_mountpoint_not_found() {
        assert!(matches!(
            classify_status_line("HTTP/1.0 404 Not Found\r\n"),
            CoreError::MountPointNotFound
        ));
    }

    #[test]
    fn classifies_401_as_auth_failure() {
        assert!(matches!(
            classify_status_line("HTTP/1.0 401 Unauthorized\r\n"),
            CoreError::AuthFailure
        ));
    }
}
