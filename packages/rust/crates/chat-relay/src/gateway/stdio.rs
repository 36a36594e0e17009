//! Stdio gateway: read line from stdin → relay single message → print reply.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::relay::{ChatRequest, RelayService};

/// Run stdio loop: read lines, relay, print reply. Exits on EOF or Ctrl+C.
///
/// Upstream failures are reported on stderr and the loop continues.
pub async fn run_stdio(relay: RelayService) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = reader.next_line().await? {
        let messages = match ChatRequest::single(line).normalize() {
            Ok(messages) => messages,
            Err(_) => continue,
        };
        match relay.reply(messages, &CancellationToken::new()).await {
            Ok(reply) => println!("{}", reply.text),
            Err(error) => eprintln!("error ({}): {error}", error.kind()),
        }
    }
    Ok(())
}
