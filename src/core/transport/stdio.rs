//! STDIO transport implementation.
//!
//! Newline-delimited JSON-RPC over standard input/output, the default MCP
//! mode. One session per process. The read loop admits messages in arrival
//! order; tool calls then run on their own tasks while a single writer task
//! owns the output stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::{TransportError, TransportResult, shutdown_requested};
use crate::core::dispatcher::{Dispatch, Dispatcher};
use crate::core::error::ErrorRecord;
use crate::core::jsonrpc::JsonRpcResponse;
use crate::core::session::Session;

/// Responses queued for the writer before the read loop has to wait.
const RESPONSE_BUFFER: usize = 64;

/// STDIO transport handler.
pub struct StdioTransport {
    grace: Duration,
}

impl StdioTransport {
    /// `grace` is how long in-flight calls may run after input ends.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Run the STDIO transport until stdin closes or shutdown is signalled.
    pub async fn run(
        &self,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> TransportResult<()> {
        info!("Ready - communicating via stdin/stdout");
        serve(
            dispatcher,
            tokio::io::stdin(),
            tokio::io::stdout(),
            shutdown,
            self.grace,
        )
        .await?;
        info!("STDIO transport finished");
        Ok(())
    }
}

/// Serve one session over an arbitrary byte stream pair.
pub async fn serve<R, W>(
    dispatcher: Dispatcher,
    reader: R,
    writer: W,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> TransportResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = Arc::new(Session::new());
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(RESPONSE_BUFFER);
    let writer_task = tokio::spawn(write_loop(writer, rx));
    // Flipped when the grace period runs out; pending calls answer with a timeout
    let (expire, expired) = watch::channel(false);

    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut reader = BufReader::new(reader);
    // Partial reads stay in `buf` across loop iterations
    let mut buf: Vec<u8> = Vec::new();
    let mut outcome: TransportResult<()> = Ok(());

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                info!("Shutdown requested, no longer reading input");
                break;
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
                continue;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        let at_eof = match read {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => {
                error!("Failed to read input: {}", e);
                outcome = Err(e.into());
                break;
            }
        };

        if !buf.is_empty() {
            let line = std::mem::take(&mut buf);
            let admitted = admit(&dispatcher, &session, &tx, &expired, &mut in_flight, &line).await;
            if let Err(e) = admitted {
                outcome = Err(e);
                break;
            }
        }

        if at_eof {
            info!("Input closed");
            break;
        }
    }

    session.close();
    drain(&mut in_flight, &expire, grace).await;
    drop(tx);

    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Response writer failed: {}", e);
            outcome = outcome.and(Err(e));
        }
        Err(e) => {
            error!("Response writer task failed: {}", e);
            outcome = outcome.and(Err(TransportError::writer(e.to_string())));
        }
    }

    outcome
}

async fn admit(
    dispatcher: &Dispatcher,
    session: &Arc<Session>,
    tx: &mpsc::Sender<JsonRpcResponse>,
    expired: &watch::Receiver<bool>,
    in_flight: &mut JoinSet<()>,
    raw: &[u8],
) -> TransportResult<()> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!("Received invalid UTF-8 input");
            return send(tx, JsonRpcResponse::parse_error(format!("invalid UTF-8: {}", e))).await;
        }
    };

    if line.is_empty() {
        return Ok(());
    }

    match dispatcher.dispatch_line(session, line) {
        Dispatch::Reply(Some(response)) => send(tx, response).await,
        Dispatch::Reply(None) => Ok(()),
        Dispatch::Deferred(call) => {
            debug!("Running tool call {} (id {})", call.name, call.id);
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            let mut expired = expired.clone();
            in_flight.spawn(async move {
                let id = call.id.clone();
                let response = tokio::select! {
                    response = dispatcher.complete(call) => response,
                    _ = shutdown_requested(&mut expired) => {
                        warn!("Tool call {} did not finish before shutdown", id);
                        JsonRpcResponse::from_record(
                            id,
                            &ErrorRecord::network("Call timed out during shutdown"),
                            dispatcher.detailed_errors(),
                        )
                    }
                };
                if tx.send(response).await.is_err() {
                    warn!("Dropping tool response: writer has stopped");
                }
            });
            Ok(())
        }
    }
}

async fn send(tx: &mpsc::Sender<JsonRpcResponse>, response: JsonRpcResponse) -> TransportResult<()> {
    tx.send(response)
        .await
        .map_err(|_| TransportError::writer("response writer has stopped"))
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<JsonRpcResponse>) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize response {}: {}", response.id, e);
                continue;
            }
        };
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Wait for in-flight calls, then make the stragglers answer with a timeout.
///
/// Every admitted call still produces exactly one response while the writer
/// is alive. Tasks are only aborted if they cannot even deliver that.
async fn drain(in_flight: &mut JoinSet<()>, expire: &watch::Sender<bool>, grace: Duration) {
    if in_flight.is_empty() {
        return;
    }

    info!(
        "Waiting up to {:?} for {} in-flight call(s)",
        grace,
        in_flight.len()
    );
    if tokio::time::timeout(grace, join_all(in_flight)).await.is_ok() {
        return;
    }

    warn!(
        "Timing out {} in-flight call(s) after grace period",
        in_flight.len()
    );
    let _ = expire.send(true);
    if tokio::time::timeout(grace, join_all(in_flight)).await.is_err() {
        warn!("Aborting {} undeliverable call(s)", in_flight.len());
        in_flight.abort_all();
        join_all(in_flight).await;
    }
}

async fn join_all(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("In-flight call cancelled"),
        Err(e) => error!("In-flight call failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::tests::test_dispatcher;
    use crate::domains::regon::testing::{ScriptedClient, record};
    use serde_json::{Value, json};
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    struct Harness {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        input: WriteHalf<DuplexStream>,
        shutdown: watch::Sender<bool>,
        server: JoinHandle<TransportResult<()>>,
    }

    impl Harness {
        fn start(client: Arc<ScriptedClient>, grace: Duration) -> Self {
            let (client_end, server_end) = tokio::io::duplex(16 * 1024);
            let (server_read, server_write) = tokio::io::split(server_end);
            let (client_read, client_write) = tokio::io::split(client_end);
            let (shutdown, shutdown_rx) = watch::channel(false);
            let server = tokio::spawn(serve(
                test_dispatcher(client),
                server_read,
                server_write,
                shutdown_rx,
                grace,
            ));
            Self {
                lines: BufReader::new(client_read).lines(),
                input: client_write,
                shutdown,
                server,
            }
        }

        async fn send(&mut self, raw: &str) {
            self.input.write_all(raw.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().expect("response line");
            serde_json::from_str(&line).unwrap()
        }

        async fn handshake(&mut self) {
            self.send(concat!(
                r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
                "\n",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                "\n"
            ))
            .await;
            let init = self.recv().await;
            assert_eq!(init["id"], 0);
        }
    }

    #[tokio::test]
    async fn test_session_over_stdio() {
        let client = Arc::new(
            ScriptedClient::new().with_records(vec![record(&[("Nip", "5261040828")])]),
        );
        let mut h = Harness::start(client, Duration::from_secs(5));

        h.send("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await;
        let early = h.recv().await;
        assert_eq!(early["error"]["code"], -32002);

        h.handshake().await;

        h.send("{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n")
            .await;
        let list = h.recv().await;
        assert_eq!(list["id"], 2);
        assert!(list["result"]["tools"].as_array().unwrap().len() >= 13);

        h.send(concat!(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"regon_search_by_nip","arguments":{"nip":"526-104-08-28"}}}"#,
            "\n"
        ))
        .await;
        let call = h.recv().await;
        assert_eq!(call["id"], 3);
        assert!(call["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("5261040828"));

        h.input.shutdown().await.unwrap();
        assert!(h.server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_input_does_not_stop_loop() {
        let mut h = Harness::start(Arc::new(ScriptedClient::new()), Duration::from_secs(1));

        h.send("this is not json\n").await;
        let parse = h.recv().await;
        assert_eq!(parse["id"], Value::Null);
        assert_eq!(parse["error"]["code"], -32700);

        h.input.write_all(b"\xff\xfe\n").await.unwrap();
        let utf8 = h.recv().await;
        assert_eq!(utf8["error"]["code"], -32700);

        h.send("\n   \n[1,2]\n").await;
        let batch = h.recv().await;
        assert_eq!(batch["error"]["code"], -32600);

        h.send("{\"jsonrpc\":\"2.0\",\"id\":\"after\",\"method\":\"ping\"}\n")
            .await;
        let pong = h.recv().await;
        assert_eq!(pong["id"], "after");
        assert_eq!(pong["result"], json!({}));
    }

    #[tokio::test]
    async fn test_final_line_without_newline_is_processed() {
        let mut h = Harness::start(Arc::new(ScriptedClient::new()), Duration::from_secs(1));
        h.send("{\"jsonrpc\":\"2.0\",\"id\":42,\"method\":\"ping\"}").await;
        h.input.shutdown().await.unwrap();

        let pong = h.recv().await;
        assert_eq!(pong["id"], 42);
        assert!(h.server.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_does_not_block_other_requests() {
        let client = Arc::new(ScriptedClient::new().with_delay(Duration::from_secs(5)));
        let mut h = Harness::start(client, Duration::from_secs(30));
        h.handshake().await;

        h.send(concat!(
            r#"{"jsonrpc":"2.0","id":"slow","method":"tools/call","params":{"name":"regon_search_by_krs","arguments":{"krs":"0000028860"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"fast","method":"ping"}"#,
            "\n"
        ))
        .await;

        let first = h.recv().await;
        assert_eq!(first["id"], "fast");
        let second = h.recv().await;
        assert_eq!(second["id"], "slow");
        assert!(second["result"].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eof_waits_for_in_flight_calls() {
        let client = Arc::new(ScriptedClient::new().with_delay(Duration::from_secs(2)));
        let mut h = Harness::start(client, Duration::from_secs(10));
        h.handshake().await;

        h.send(concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"regon_search_by_nip","arguments":{"nip":"5261040828"}}}"#,
            "\n"
        ))
        .await;
        h.input.shutdown().await.unwrap();

        let response = h.recv().await;
        assert_eq!(response["id"], 7);
        assert!(h.server.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_times_out_calls_after_grace() {
        let client = Arc::new(ScriptedClient::new().with_delay(Duration::from_secs(600)));
        let mut h = Harness::start(client, Duration::from_secs(1));
        h.handshake().await;

        h.send(concat!(
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"regon_search_by_nip","arguments":{"nip":"5261040828"}}}"#,
            "\n"
        ))
        .await;
        tokio::task::yield_now().await;
        h.shutdown.send(true).unwrap();

        let timed_out = h.recv().await;
        assert_eq!(timed_out["id"], 8);
        assert_eq!(timed_out["error"]["code"], -32003);
        assert!(timed_out["error"]["message"]
            .as_str()
            .unwrap()
            .contains("shutdown"));

        let started = tokio::time::Instant::now();
        assert!(h.server.await.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(600));

        // Exactly one response for the call, then the writer closes
        assert!(h.lines.next_line().await.unwrap().is_none());
    }
}
