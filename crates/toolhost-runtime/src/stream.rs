//! Async stream log readers (non-UTF8-safe).
//!
//! Helpers can emit non-UTF8 bytes on stdout/stderr. `BufReader::lines()`
//! would end the reader task on invalid UTF-8, so lines are read as bytes
//! and decoded lossily.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use toolhost_core::{LogStream, ProcessLogSinkPort};
use tracing::debug;

pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    process_id: String,
    stream_type: LogStream,
    sink: Option<Arc<dyn ProcessLogSinkPort>>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let line = String::from_utf8_lossy(&buf).into_owned();
                    debug!(process_id = %process_id, stream = %stream_type, "{line}");
                    if let Some(ref s) = sink {
                        s.append(&process_id, stream_type, line);
                    }
                }
                Err(e) => {
                    debug!(process_id = %process_id, stream = %stream_type, error = %e, "log stream reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(process_id = %process_id, stream = %stream_type, "log stream reader task exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::ProcessLogManager;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, duplex};

    #[tokio::test]
    async fn reader_survives_invalid_utf8() {
        let logs = Arc::new(ProcessLogManager::new());
        let (mut tx, rx) = duplex(256);
        spawn_stream_reader(
            rx,
            "fs".to_string(),
            LogStream::Stderr,
            Some(logs.clone() as Arc<dyn ProcessLogSinkPort>),
        );

        tx.write_all(b"bad \xff byte\r\nsecond\n").await.unwrap();
        drop(tx);

        for _ in 0..50 {
            if logs.get_logs("fs").len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let lines: Vec<String> = logs.get_logs("fs").into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["bad \u{fffd} byte".to_string(), "second".to_string()]);
    }
}
