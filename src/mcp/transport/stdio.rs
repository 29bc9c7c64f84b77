//! Line-delimited stdio transport.
//!
//! Reads one JSON-RPC message per line from stdin and writes one response
//! per line to stdout. Log output goes to stderr, so stdout stays a clean
//! protocol channel. EOF on stdin ends the transport.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::ServerError;
use crate::mcp::server::McpServer;

/// Spawns the stdio read/write loop as a background task.
pub fn spawn(server: Arc<McpServer>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = run(server, shutdown).await {
            error!(error = %err, "stdio transport failed");
        }
    })
}

async fn run(
    server: Arc<McpServer>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    info!("stdio transport started");
    let result = serve_lines(
        &server,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await;
    info!("stdio transport stopped");
    result
}

/// The read/dispatch/write loop over any line-oriented duplex pair.
///
/// Blank lines are skipped; EOF on the reader or a shutdown signal ends the
/// loop. Notifications produce no output line.
async fn serve_lines<R, W>(
    server: &McpServer,
    reader: R,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => {
                match line.map_err(ServerError::Stdio)? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(response) = server.handle_message(line) {
                            write_line(&mut writer, &response).await?;
                        }
                    }
                    None => {
                        info!("EOF on stdin, stopping stdio transport");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Writes one newline-terminated response and flushes.
async fn write_line<W>(writer: &mut W, response: &str) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    // Framing invariant: one message per line.
    debug_assert!(
        !response.contains('\n'),
        "serialised responses must not contain newlines"
    );

    writer
        .write_all(response.as_bytes())
        .await
        .map_err(ServerError::Stdio)?;
    writer.write_all(b"\n").await.map_err(ServerError::Stdio)?;
    writer.flush().await.map_err(ServerError::Stdio)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::config::{default_config, Environment};
    use crate::skills::InMemoryRegistry;

    fn test_server() -> McpServer {
        McpServer::new(
            default_config(Environment::Development),
            Arc::new(InMemoryRegistry::new()),
        )
    }

    #[tokio::test]
    async fn serve_lines_answers_each_request_and_stops_at_eof() {
        let server = test_server();
        let (_keep_alive, shutdown) = watch::channel(false);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let mut output = Vec::new();

        serve_lines(&server, BufReader::new(input.as_bytes()), &mut output, shutdown)
            .await
            .unwrap();

        // One response per request line; the blank line and the notification
        // contribute nothing, and EOF ends the loop cleanly.
        let text = String::from_utf8(output).unwrap();
        let responses: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], serde_json::json!(1));
        assert_eq!(responses[1]["id"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn serve_lines_stops_on_shutdown_signal() {
        let server = test_server();
        let (trigger, shutdown) = watch::channel(false);
        let (read_half, _write_half) = tokio::io::simplex(64);
        let mut output = Vec::new();

        trigger.send(true).unwrap();
        serve_lines(&server, BufReader::new(read_half), &mut output, shutdown)
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let mut buffer = Vec::new();
        write_line(&mut buffer, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
            .await
            .unwrap();
        assert_eq!(buffer, b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    #[tokio::test]
    async fn write_line_keeps_messages_separate() {
        let mut buffer = Vec::new();
        write_line(&mut buffer, "first").await.unwrap();
        write_line(&mut buffer, "second").await.unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["first", "second"]);
    }
}
