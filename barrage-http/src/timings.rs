use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request phase breakdown. Connection phases are zero when a pooled
/// connection was reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTimings {
    /// Time spent before the connection was usable, excluding DNS, TCP and TLS.
    pub blocked: Duration,
    pub looking_up: Duration,
    pub connecting: Duration,
    pub tls_handshaking: Duration,
    pub sending: Duration,
    /// Time to first response byte after the request was sent.
    pub waiting: Duration,
    pub receiving: Duration,
    /// `sending + waiting + receiving`.
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct ConnectPhases {
    pub(crate) looking_up: Duration,
    pub(crate) connecting: Duration,
    pub(crate) tls_handshaking: Duration,
    pub(crate) established_at: Option<Instant>,
}

pub(crate) type PhaseCell = Arc<Mutex<ConnectPhases>>;

tokio::task_local! {
    pub(crate) static CONNECT_PHASES: PhaseCell;
}

/// Cell of the request currently being driven on this task, if any.
pub(crate) fn current_phases() -> Option<PhaseCell> {
    CONNECT_PHASES.try_with(Arc::clone).ok()
}

pub(crate) struct Marks {
    pub(crate) started: Instant,
    pub(crate) sent: Option<Instant>,
    pub(crate) head: Instant,
    pub(crate) done: Instant,
}

impl RequestTimings {
    pub(crate) fn from_marks(marks: &Marks, phases: &ConnectPhases) -> Self {
        let ready = phases.established_at.unwrap_or(marks.started);
        let setup = ready.saturating_duration_since(marks.started);
        let dialing = phases.looking_up + phases.connecting + phases.tls_handshaking;

        let sending = marks
            .sent
            .map(|s| s.saturating_duration_since(ready))
            .unwrap_or_default();
        let waiting = marks
            .head
            .saturating_duration_since(marks.sent.unwrap_or(ready).max(ready));
        let receiving = marks.done.saturating_duration_since(marks.head);

        Self {
            blocked: setup.saturating_sub(dialing),
            looking_up: phases.looking_up,
            connecting: phases.connecting,
            tls_handshaking: phases.tls_handshaking,
            sending,
            waiting,
            receiving,
            duration: sending + waiting + receiving,
        }
    }
}
