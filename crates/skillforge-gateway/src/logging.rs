//! Wires the `tracing-subscriber` `fmt` writer so every formatted log line
//! also goes out over a broadcast channel, letting `/admin/logs/stream`
//! tail the process's own logs without tailing a file.

use std::io::Write;

use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone)]
pub(crate) struct BroadcastMakeWriter {
    pub sender: broadcast::Sender<String>,
}

impl<'a> MakeWriter<'a> for BroadcastMakeWriter {
    type Writer = BroadcastWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BroadcastWriter {
            sender: self.sender.clone(),
        }
    }
}

pub(crate) struct BroadcastWriter {
    sender: broadcast::Sender<String>,
}

impl Write for BroadcastWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(line); // no subscribers yet is not an error
        std::io::stdout().write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}
