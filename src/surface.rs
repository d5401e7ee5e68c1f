//! Authenticated request surface over a Unix domain socket.
//!
//! Line-delimited JSON: each connection carries one newline-terminated
//! request and receives one response line. The listener is non-blocking and
//! polled from the control loop, so requests complete synchronously within a
//! single loop iteration and never interleave with an alarm firing.
//!
//! Status queries are unauthenticated; schedule changes must carry the
//! shared key and are rejected before the payload is even parsed into a
//! candidate schedule.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::engine::ActiveState;
use crate::schedule::{ScheduleRequest, Span, TimeOfDay, WeekendOverride};
use crate::time_source::WallClock;

/// Per-client I/O deadline; a stalled client cannot wedge the control loop
/// for longer than this.
const CLIENT_TIMEOUT_MS: u64 = 250;

/// Wire request accepted on the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Read-only status summary; no key required.
    Status,
    /// Replace the active schedule; requires the shared key.
    Apply(ApplyForm),
}

/// Submission fields of an apply request. Times are `"HH:MM"` strings; the
/// weekend fields are all-or-nothing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyForm {
    pub key: String,
    pub day_start: String,
    pub day_end: String,
    pub night_start: String,
    pub night_end: String,
    pub day_intensity: u8,
    pub night_intensity: u8,
    #[serde(default)]
    pub dst: bool,
    #[serde(default)]
    pub weekend_day_start: Option<String>,
    #[serde(default)]
    pub weekend_day_end: Option<String>,
    #[serde(default)]
    pub weekend_night_start: Option<String>,
    #[serde(default)]
    pub weekend_night_end: Option<String>,
}

impl ApplyForm {
    /// Parse and range-check the submission into a candidate schedule.
    pub fn to_schedule(&self) -> Result<ScheduleRequest, Error> {
        let day = Span {
            start: TimeOfDay::parse(&self.day_start)?,
            end: TimeOfDay::parse(&self.day_end)?,
        };
        let night = Span {
            start: TimeOfDay::parse(&self.night_start)?,
            end: TimeOfDay::parse(&self.night_end)?,
        };
        let weekend = WeekendOverride::from_fields(
            self.weekend_day_start.as_deref(),
            self.weekend_day_end.as_deref(),
            self.weekend_night_start.as_deref(),
            self.weekend_night_end.as_deref(),
        )?;
        Ok(ScheduleRequest {
            day,
            night,
            day_intensity: self.day_intensity,
            night_intensity: self.night_intensity,
            dst: self.dst,
            weekend,
        })
    }
}

/// Wire response written back to the client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    Status(StatusPayload),
    Error { message: String },
}

/// Status summary rendered for clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusPayload {
    pub weekday: String,
    pub time: String,
    pub day: Span,
    pub night: Span,
    pub day_intensity: u8,
    pub night_intensity: u8,
    pub dst: bool,
    pub weekend: Option<WeekendOverride>,
    pub day_active: bool,
    pub night_active: bool,
    pub persisted: bool,
}

impl StatusPayload {
    /// Snapshot the engine state for rendering.
    pub fn collect(state: &ActiveState, now: WallClock) -> Self {
        Self {
            weekday: weekday_name(now.weekday()).to_string(),
            time: now.hms(),
            day: state.day.span,
            night: state.night.span,
            day_intensity: state.day_intensity,
            night_intensity: state.night_intensity,
            dst: state.dst_active,
            weekend: match (&state.weekend_day, &state.weekend_night) {
                (Some(day), Some(night)) => Some(WeekendOverride {
                    day: day.span,
                    night: night.span,
                }),
                _ => None,
            },
            day_active: state.output.day_active,
            night_active: state.output.night_active,
            persisted: state.persisted,
        }
    }
}

fn weekday_name(weekday: chrono::Weekday) -> &'static str {
    match weekday {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// Unix socket server polled from the control loop.
pub struct Surface {
    socket_path: PathBuf,
    listener: UnixListener,
    secret: Option<String>,
}

impl Surface {
    /// Bind the socket, replacing a stale file from a previous run.
    ///
    /// `secret` is the shared key required by apply requests; without one,
    /// every schedule change is refused.
    pub fn bind(socket_path: &Path, secret: Option<String>) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {socket_path:?}"))?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
        }
        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {socket_path:?}"))?;
        listener
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            secret,
        })
    }

    /// Check a submitted key against the configured shared secret.
    pub fn authorize(&self, key: &str) -> bool {
        self.secret.as_deref().is_some_and(|secret| key == secret)
    }

    /// Accept and answer every pending connection.
    ///
    /// `handle` receives only requests that passed authentication; the
    /// response it returns is written back to the client verbatim.
    pub fn poll<F>(&mut self, debug_enabled: bool, mut handle: F)
    where
        F: FnMut(Request) -> Response,
    {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(e) = self.serve_client(stream, &mut handle)
                        && debug_enabled
                    {
                        log_debug!("Surface client error: {e}");
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log_warning!("Surface accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn serve_client<F>(&self, stream: UnixStream, handle: &mut F) -> Result<()>
    where
        F: FnMut(Request) -> Response,
    {
        stream.set_nonblocking(false)?;
        let timeout = Some(Duration::from_millis(CLIENT_TIMEOUT_MS));
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        let response = match serde_json::from_str::<Request>(line.trim()) {
            Ok(Request::Apply(form)) if !self.authorize(&form.key) => Response::Error {
                message: "unauthorized".to_string(),
            },
            Ok(request) => handle(request),
            Err(e) => Response::Error {
                message: format!("malformed request: {e}"),
            },
        };

        let mut writer = stream;
        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// One-shot client: send a request and read the single response line.
pub fn send_request(socket_path: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .with_context(|| format!("Failed to connect to {socket_path:?}; is nightlightr running?"))?;
    let timeout = Some(Duration::from_secs(2));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let mut writer = stream.try_clone()?;
    let json = serde_json::to_string(request)?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).context("No response from daemon")?;
    serde_json::from_str(line.trim()).context("Malformed response from daemon")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(weekend: [Option<&str>; 4]) -> ApplyForm {
        ApplyForm {
            key: "k".to_string(),
            day_start: "07:00".to_string(),
            day_end: "19:00".to_string(),
            night_start: "19:00".to_string(),
            night_end: "07:00".to_string(),
            day_intensity: 80,
            night_intensity: 30,
            dst: false,
            weekend_day_start: weekend[0].map(String::from),
            weekend_day_end: weekend[1].map(String::from),
            weekend_night_start: weekend[2].map(String::from),
            weekend_night_end: weekend[3].map(String::from),
        }
    }

    #[test]
    fn form_parses_into_candidate_schedule() {
        let request = form([Some("09:00"), Some("20:00"), Some("22:00"), Some("06:00")])
            .to_schedule()
            .unwrap();
        assert_eq!(request.day.start, TimeOfDay::parse("07:00").unwrap());
        assert!(request.weekend.is_some());

        let request = form([None, None, None, None]).to_schedule().unwrap();
        assert!(request.weekend.is_none());
    }

    #[test]
    fn form_propagates_model_errors() {
        let mut bad = form([None, None, None, None]);
        bad.day_start = "24:00".to_string();
        assert_eq!(
            bad.to_schedule().unwrap_err(),
            Error::InvalidTimeOfDay("24:00".to_string())
        );

        let partial = form([Some("09:00"), None, None, None]);
        assert_eq!(
            partial.to_schedule().unwrap_err(),
            Error::IncompleteWeekendSchedule
        );
    }

    #[test]
    fn missing_secret_refuses_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let surface = Surface::bind(&dir.path().join("nightlightr.sock"), None).unwrap();
        assert!(!surface.authorize(""));
        assert!(!surface.authorize("anything"));

        let keyed =
            Surface::bind(&dir.path().join("keyed.sock"), Some("hunter2".to_string())).unwrap();
        assert!(keyed.authorize("hunter2"));
        assert!(!keyed.authorize("hunter"));
    }

    #[test]
    fn poll_answers_status_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightlightr.sock");
        let mut surface = Surface::bind(&path, None).unwrap();

        let client = std::thread::spawn({
            let path = path.clone();
            move || send_request(&path, &Request::Status)
        });

        // Poll until the client's request has been served.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !client.is_finished() && std::time::Instant::now() < deadline {
            surface.poll(false, |request| match request {
                Request::Status => Response::Status(StatusPayload::collect(
                    &ActiveState::default(),
                    WallClock::from_epoch(0),
                )),
                Request::Apply(_) => Response::Error {
                    message: "unexpected".to_string(),
                },
            });
            std::thread::sleep(Duration::from_millis(10));
        }

        match client.join().unwrap().unwrap() {
            Response::Status(status) => {
                assert_eq!(status.weekday, "Thursday");
                assert!(!status.persisted);
            }
            Response::Error { message } => panic!("unexpected error: {message}"),
        }
    }
}
