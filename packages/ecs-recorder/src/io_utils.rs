//! I/O error classification and bounded retry for the recorder's writer
//! thread: distinguishes transient conditions worth retrying from
//! permanent failures that should abort the write.

use std::io::ErrorKind;

use crate::error::RecorderError;

pub fn classify_io_error(error: std::io::Error, context: &str) -> RecorderError {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            RecorderError::TransientIo(format!("{context}: {error}"))
        }
        _ => RecorderError::Io(error),
    }
}

pub fn retry_io_operation<F, T>(
    mut operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, RecorderError>
where
    F: FnMut() -> Result<T, RecorderError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }
                if let RecorderError::TransientIo(_) = err {
                    tracing::warn!(
                        attempt,
                        max_retries,
                        context,
                        "transient I/O error in recorder writer, retrying"
                    );
                    if retry_delay_ms > 0 {
                        std::thread::sleep(std::time::Duration::from_millis(retry_delay_ms));
                    }
                    continue;
                }
                return Err(err);
            }
        }
    }
}
