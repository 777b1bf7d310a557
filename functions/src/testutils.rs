use async_trait::async_trait;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use parking_lot::Mutex;
use queue::{Ack, QueueError, QueueSender};
use shared::http::make_text_response;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use url::Url;
use uuid::Uuid;

pub fn url(port: u16, path: &str) -> Url {
    Url::parse(&format!("http://127.0.0.1:{port}{path}")).unwrap()
}

/// Starts a server answering every request with `status` and `body`.
pub async fn start_text_server(status: StatusCode, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let service = service_fn(move |_request: Request<Incoming>| async move {
        Ok::<_, std::io::Error>(make_text_response::<std::io::Error>(status, body))
    });
    tokio::spawn(shared::http::serve(listener, service));
    port
}

/// Sender that keeps every payload, or fails every send.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Bytes>>,
    pub fail: bool,
}

impl RecordingSender {
    pub fn failing() -> Self {
        RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl QueueSender for RecordingSender {
    async fn send(&self, payload: Bytes) -> Result<Ack, QueueError> {
        if self.fail {
            return Err(QueueError::InvalidQueueName);
        }
        let mut sent = self.sent.lock();
        sent.push(payload);
        Ok(Ack {
            message_id: Uuid::new_v4(),
            sequence_number: sent.len() as u64,
        })
    }
}

/// Collects formatted log lines emitted on the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Captures until the guard is dropped. Needs the current-thread runtime.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Index of the first line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|line| line.contains(needle))
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(self.0.clone())
    }
}
