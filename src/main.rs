use anyhow::{Context, Result, bail};
use clap::Parser;
use hostpool::env::{Env, RequestEnv, ResponseEnv};
use hostpool::http::ReqwestTransport;
use hostpool::{Adapter, AdapterConfig, Scope};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// hostpool - send HTTP requests through pooled per-host clients
///
/// All URLs share one adapter, so requests to the same host reuse one client.
///
/// Examples:
///   hostpool https://example.com/a https://example.com/b
///   hostpool -X POST -H "content-type: application/json" -d '{}' https://example.com/items
#[derive(Parser, Debug)]
#[command(author, version = env!("HOSTPOOL_VERSION"), about)]
struct Cli {
    /// URLs to request, in order
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// HTTP method
    #[arg(short = 'X', long = "method", default_value = "GET")]
    method: String,

    /// Request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long = "data", value_name = "BODY")]
    data: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms", env = "HOSTPOOL_TIMEOUT_MS", value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Close clients after every request instead of reusing them
    #[arg(long = "no-persistent")]
    no_persistent: bool,

    /// Verify server certificates (off by default)
    #[arg(long = "verify-tls", env = "HOSTPOOL_VERIFY_TLS")]
    verify_tls: bool,

    /// Print each response as a JSON object
    #[arg(long = "json")]
    json: bool,
}

impl Cli {
    fn config(&self) -> AdapterConfig {
        let mut config = AdapterConfig::new()
            .persistent(!self.no_persistent)
            .verify_peer(self.verify_tls);
        if let Some(ms) = self.timeout_ms {
            config = config.timeout(Duration::from_millis(ms));
        }
        config
    }

    fn request(&self, url: &str) -> Result<RequestEnv> {
        let mut request = RequestEnv::new(&self.method, url);
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            request = request.header(name, value)?;
        }
        if let Some(data) = &self.data {
            request = request.body(data.clone());
        }
        Ok(request)
    }
}

#[derive(Serialize)]
struct PrintedResponse<'a> {
    url: &'a str,
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
}

impl<'a> PrintedResponse<'a> {
    fn new(url: &'a str, response: &ResponseEnv) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Self {
            url,
            status: response.status,
            headers,
            body: response.text().into_owned(),
        }
    }
}

fn parse_header(header: &str) -> Result<(&str, &str)> {
    let (name, value) = header
        .split_once(':')
        .with_context(|| format!("Invalid header '{}'. Expected 'Name: value'.", header))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}'. Header name is empty.", header);
    }
    Ok((name, value.trim()))
}

fn print_response(cli: &Cli, url: &str, response: &ResponseEnv) -> Result<()> {
    if cli.json {
        let printed = PrintedResponse::new(url, response);
        println!("{}", serde_json::to_string(&printed)?);
    } else {
        println!("HTTP {} {}", response.status, url);
        println!("{}", response.text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let adapter = Adapter::new(ReqwestTransport::new(), cli.config());
    debug!("Adapter persistent: {}", adapter.is_persistent());

    let mut failed = 0;
    for url in &cli.urls {
        let outcome = match cli.request(url) {
            Ok(request) => adapter.call(Env::new(request), Scope::Nested).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Env {
                response: Some(response),
                ..
            }) => print_response(&cli, url, &response)?,
            Ok(_) => {
                eprintln!("{}: no response", url);
                failed += 1;
            }
            Err(e) => {
                eprintln!("{}: {:#}", url, e);
                failed += 1;
            }
        }
    }

    adapter.close().await?;

    if failed > 0 {
        bail!("{} of {} requests failed", failed, cli.urls.len());
    }
    Ok(())
}
