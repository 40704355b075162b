use tokio::sync::watch;

/// Current status text with an optional detail line (error message and such).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusText {
    pub status: Option<String>,
    pub detail: Option<String>,
}

/// Single human-readable status line, observable by the shell and mirrored to
/// the log whenever it changes.
#[derive(Debug)]
pub struct StatusLine {
    source: String,
    tx: watch::Sender<StatusText>,
}

impl StatusLine {
    pub fn new(source: &str) -> Self {
        let (tx, _) = watch::channel(StatusText::default());
        Self {
            source: source.to_string(),
            tx,
        }
    }

    pub fn set(&self, status: impl Into<String>) {
        self.replace(Some(status.into()), None);
    }

    pub fn set_with_detail(&self, status: impl Into<String>, detail: impl Into<String>) {
        self.replace(Some(status.into()), Some(detail.into()));
    }

    pub fn clear(&self) {
        self.replace(None, None);
    }

    pub fn current(&self) -> StatusText {
        self.tx.borrow().clone()
    }

    pub fn text(&self) -> Option<String> {
        self.tx.borrow().status.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusText> {
        self.tx.subscribe()
    }

    fn replace(&self, status: Option<String>, detail: Option<String>) {
        let next = StatusText { status, detail };
        if *self.tx.borrow() == next {
            return;
        }
        match (&next.status, &next.detail) {
            (Some(status), Some(detail)) => {
                tracing::info!(source = %self.source, detail = %detail, "{status}")
            }
            (Some(status), None) => tracing::info!(source = %self.source, "{status}"),
            _ => tracing::debug!(source = %self.source, "Status cleared"),
        }
        self.tx.send_replace(next);
    }
}
