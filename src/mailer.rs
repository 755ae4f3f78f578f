use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> anyhow::Result<()>;
}

/// Development transport: writes outgoing mail to the log instead of a relay.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> anyhow::Result<()> {
        // The body may carry a reset link; only its size is logged.
        info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "outgoing mail"
        );
        Ok(())
    }
}

#[cfg(test)]
pub use fakes::{FailingMailer, RecordingMailer};


#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing::Level;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_mailer_never_writes_the_body() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        LogMailer
            .send(Message {
                to: "ada@example.com".into(),
                subject: "Your password reset token".into(),
                body: "PATCH https://greenhouse.test/api/v1/users/resetPassword/deadbeefcafe".into(),
            })
            .await
            .unwrap();

        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("ada@example.com"));
        assert!(logged.contains("body_len"));
        assert!(!logged.contains("deadbeefcafe"));
        assert!(!logged.contains("resetPassword"));
    }
}
