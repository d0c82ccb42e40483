//! Stdio transport: line-delimited JSON envelopes on a pair of byte
//! streams, by default the process stdin/stdout.
//!
//! A reader task turns each line into a batch for the session; outbound
//! frames serialize one envelope per line. Log output must never touch
//! stdout (it would collide with frames), so [`init_logging`] points the
//! default `tracing` subscriber at stderr or a file.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::ServerCore;
use crate::frame::{Frame, FrameEvent};
use crate::router::TransportKind;
use crate::session::{Session, SessionMessage};
use wisp_mcp_json_rpc::parse_body;
use wisp_mcp_protocol::notifications;

/// Where the default logger writes. Stdout is never an option here.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    Off,
}

/// Install the global `tracing` subscriber for a stdio server. Call once,
/// before [`StdioTransport::run`].
pub fn init_logging(target: LogTarget) -> std::io::Result<()> {
    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();
        }
        LogTarget::File(path) => {
            let file = Arc::new(std::fs::File::create(path)?);
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(move || SharedFile(file.clone()))
                .with_ansi(false)
                .init();
        }
        LogTarget::Off => {}
    }
    Ok(())
}

struct SharedFile(Arc<std::fs::File>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.0).flush()
    }
}

pub struct StdioTransport;

impl StdioTransport {
    /// Serve one session over process stdin/stdout until EOF.
    pub async fn run(core: Arc<ServerCore>) -> std::io::Result<()> {
        Self::run_with(core, tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one session over an arbitrary stream pair (used by tests and
    /// embedded setups).
    pub async fn run_with<R, W>(core: Arc<ServerCore>, input: R, output: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(256);

        let opened = Session::open(
            core,
            frame_tx.clone(),
            false,
            TransportKind::Stdio,
            HashMap::new(),
        )
        .await
        .map_err(|reject| {
            std::io::Error::other(format!("connection rejected: {:?}", reject))
        })?;

        let writer = tokio::spawn(write_frames(output, frame_rx));

        let mut lines = BufReader::new(input).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_body(line) {
                        Ok(items) => {
                            if opened
                                .handle
                                .send(SessionMessage::Dispatch {
                                    items,
                                    reply_to: frame_tx.clone(),
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(err) => {
                            let _ = frame_tx.send(Frame::error(err)).await;
                        }
                    }
                }
                Ok(None) => {
                    debug!(session = %opened.id, "stdin EOF");
                    break;
                }
                Err(err) => {
                    warn!(session = %opened.id, "stdin read error: {}", err);
                    break;
                }
            }
        }

        let _ = opened.handle.send(SessionMessage::ReaderClosed).await;
        drop(frame_tx);
        let _ = writer.await;
        Ok(())
    }
}

/// Serialize frames to the output stream, one envelope per line. `closed`
/// frames have no stdio wire form; the stream simply ends with the session.
async fn write_frames<W>(mut output: W, mut frames: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let line = match frame.event {
            FrameEvent::Message => match frame.data {
                Some(data) => data.to_string(),
                None => continue,
            },
            FrameEvent::Ping => match serde_json::to_string(&notifications::ping()) {
                Ok(line) => line,
                Err(_) => continue,
            },
            // Batch and session lifecycle frames have no stdio wire form.
            FrameEvent::Closed => continue,
        };
        if output.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if output.write_all(b"\n").await.is_err() {
            break;
        }
        if output.flush().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreOptions;
    use crate::router::Router;
    use crate::session::HandlerResult;
    use crate::tool::ToolSpec;
    use wisp_mcp_protocol::content::CallToolResult;
    use wisp_mcp_protocol::{FieldSchema, InputSchema};

    fn test_core() -> Arc<ServerCore> {
        let router = Router::builder("stdio-test", "1.0")
            .tool(ToolSpec::new(
                "echo_tool",
                InputSchema::fields(vec![("message", FieldSchema::string().required())]),
                |args, _req, _ctx| async move {
                    let message = args["message"].as_str().unwrap_or_default().to_string();
                    HandlerResult::reply(CallToolResult::text(message))
                },
            ))
            .build();
        ServerCore::new(router, CoreOptions::default())
    }

    #[tokio::test]
    async fn test_line_in_line_out() {
        let core = test_core();
        let (client_writer, server_input) = tokio::io::duplex(4096);
        let (server_output, client_reader) = tokio::io::duplex(4096);

        let server = tokio::spawn(StdioTransport::run_with(core, server_input, server_output));

        let mut client_writer = client_writer;
        client_writer
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\
                  \"params\":{\"name\":\"echo_tool\",\"arguments\":{\"message\":\"hi\"}}}\n",
            )
            .await
            .unwrap();

        let mut lines = BufReader::new(client_reader).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["content"][0]["text"], "hi");

        // EOF terminates the session gracefully.
        drop(client_writer);
        server.await.unwrap().unwrap();
    }
}
