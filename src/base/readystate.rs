/// The externally visible progress of a `Request`.
/// This roughly matches the XMLHttpRequest `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    /// Created, `open()` not called yet.
    #[default]
    Unsent,

    /// `open()` succeeded; `send()` may be called.
    Opened,

    /// The status line and headers have arrived.
    HeadersReceived,

    /// The body is being received.
    Loading,

    /// The transfer finished; the completion callback has not run yet.
    /// Internal: callers observe `Done` once `Client::poll()` delivers it.
    Complete,

    /// Terminal. Success or failure is reported by the error flag.
    Done,
}

impl ReadyState {
    /// Whether a transfer is outstanding.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ReadyState::HeadersReceived | ReadyState::Loading | ReadyState::Complete
        )
    }
}
