//! stdio-to-HTTP bridge for clients that only speak stdio (spec §4.8).
//!
//! Direct descendant of the teacher's `mcp-hub-bridge`: reads NDJSON from
//! stdin, forwards each line to a running aggregator's `/mcp` endpoint over
//! HTTP, and writes the JSON-RPC response back to stdout. Generalized to
//! discover its target via the PID file instead of a hardcoded port, since
//! there's only ever one aggregated endpoint to find instead of one per
//! upstream id.

use agg_mcp::pidfile;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

struct Args {
    config_dir: std::path::PathBuf,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut config_dir = std::env::var("ONE_MCP_CONFIG_DIR").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("."));

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-dir" => {
                let val = args.next().ok_or("--config-dir requires a value")?;
                config_dir = std::path::PathBuf::from(val);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(Args { config_dir })
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("agg-mcp-bridge: {}", e);
            eprintln!("Usage: agg-mcp-bridge [--config-dir <DIR>]");
            return std::process::ExitCode::from(1);
        }
    };

    let client = reqwest::Client::new();
    let base_url = match pidfile::discover(&args.config_dir, &client).await {
        Ok(url) => url,
        Err(e) => {
            eprintln!("agg-mcp-bridge: {}", e);
            return std::process::ExitCode::from(1);
        }
    };
    let mcp_url = format!("{}/mcp", base_url);

    eprintln!("agg-mcp-bridge: proxying stdio <-> {}", mcp_url);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();
    let mut session_id: Option<String> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = handle_line(&client, &mcp_url, &line, &mut stdout, &mut session_id).await {
                            eprintln!("agg-mcp-bridge: error: {}", e);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("agg-mcp-bridge: stdin error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("agg-mcp-bridge: interrupted");
                break;
            }
        }
    }

    if let Some(id) = &session_id {
        eprintln!("agg-mcp-bridge: shutting down, sending DELETE for session cleanup");
        let _ = client.delete(&mcp_url).header("MCP-Session-Id", id).send().await;
    }

    std::process::ExitCode::SUCCESS
}

async fn handle_line(
    client: &reqwest::Client,
    url: &str,
    line: &str,
    stdout: &mut tokio::io::Stdout,
    session_id: &mut Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(line)?;

    let mut request = client.post(url).header("Content-Type", "application/json");
    if let Some(id) = session_id.as_ref() {
        request = request.header("MCP-Session-Id", id);
    }

    let response = match request.json(&value).send().await {
        Ok(r) => r,
        Err(e) => {
            if let Some(id) = value.get("id") {
                write_error(stdout, id.clone(), format!("aggregator unreachable: {}", e)).await?;
            }
            return Ok(());
        }
    };

    if let Some(id) = response.headers().get("MCP-Session-Id").and_then(|v| v.to_str().ok()) {
        *session_id = Some(id.to_string());
    }

    let status = response.status();
    if status.as_u16() == 202 {
        return Ok(());
    }

    if !status.is_success() {
        if let Some(id) = value.get("id") {
            let body = response.text().await.unwrap_or_default();
            write_error(stdout, id.clone(), format!("HTTP {}: {}", status.as_u16(), body)).await?;
        }
        return Ok(());
    }

    let body = response.bytes().await?;
    stdout.write_all(&body).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn write_error(stdout: &mut tokio::io::Stdout, id: serde_json::Value, message: String) -> Result<(), Box<dyn std::error::Error>> {
    let err = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": -32000, "message": message }
    });
    let mut out = serde_json::to_vec(&err)?;
    out.push(b'\n');
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
