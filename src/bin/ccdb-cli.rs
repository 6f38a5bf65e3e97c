//! ccdb-cli
//!
//! An interactive client. Each line typed at the prompt is split on
//! whitespace, sent as a RESP array and the decoded reply is printed.

use anyhow::{bail, Context};
use bytes::{Buf, BytesMut};
use ccdb::commands::encode_command;
use ccdb::protocol::{parse_message, RespValue};
use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Command-line client for ccdb
#[derive(Parser, Debug)]
#[command(name = "ccdb-cli", version, about)]
struct CliArgs {
    /// Server host
    #[arg(long, default_value = ccdb::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = ccdb::DEFAULT_PORT)]
    port: u16,
}

/// Sends one request and waits for its complete reply.
async fn round_trip(
    stream: &mut TcpStream,
    pending: &mut BytesMut,
    request: &RespValue,
) -> anyhow::Result<RespValue> {
    stream.write_all(&request.serialize()).await?;

    loop {
        if let Some((reply, consumed)) = parse_message(&pending[..])? {
            pending.advance(consumed);
            return Ok(reply);
        }
        if stream.read_buf(pending).await? == 0 {
            bail!("server closed the connection");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("could not connect to {}", address))?;
    let mut pending = BytesMut::with_capacity(4096);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}> ", address);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let reply = round_trip(&mut stream, &mut pending, &encode_command(line)).await?;
        println!("{}", reply);
    }

    Ok(())
}
