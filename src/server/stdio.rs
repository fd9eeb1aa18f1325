//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! One frame per line. The session id returned by `initialize` is
//! remembered for the following lines, so stdio clients never send it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::bridge::{Bridge, BridgeReply, CallOrigin};
use crate::protocol::{self, methods, Call};

/// Serve frames from `reader` until EOF, writing replies to `writer`.
pub async fn serve_lines<R, W>(bridge: Arc<Bridge>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut session_id: Option<String> = None;

    while let Some(line) = lines.next_line().await.context("Failed to read frame")? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match protocol::decode(line.as_bytes()) {
            Err(e) => Some(e.into_response()),
            Ok(call) => {
                let is_shutdown = matches!(&call, Call::Request { method, .. } if method == methods::SHUTDOWN);
                match bridge
                    .handle(call, CallOrigin::request_response(session_id.clone()))
                    .await
                {
                    BridgeReply::Accepted => None,
                    BridgeReply::Response {
                        response,
                        session_id: new_session,
                    } => {
                        if new_session.is_some() {
                            session_id = new_session;
                        } else if is_shutdown && !response.is_error() {
                            session_id = None;
                        }
                        Some(response)
                    }
                }
            }
        };

        if let Some(response) = reply {
            let mut frame = protocol::encode(&response);
            frame.push('\n');
            writer
                .write_all(frame.as_bytes())
                .await
                .context("Failed to write reply")?;
            writer.flush().await.context("Failed to flush reply")?;
        }
    }

    debug!("Input closed");
    if let Some(id) = session_id {
        if let Err(e) = bridge.close_session(Some(&id)).await {
            debug!("Session {} already gone: {}", id, e);
        }
    }
    Ok(())
}

pub async fn run_stdio(bridge: Arc<Bridge>) -> Result<()> {
    info!("Serving JSON-RPC on stdio");
    serve_lines(
        bridge,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
