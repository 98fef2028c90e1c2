use clap::Parser;

use asyncweb::client::{ClientError, RequestOptions, WebClient};
use asyncweb::config::ClientConfig;

#[derive(Parser)]
#[command(name = "web-cli")]
#[command(about = "Issue a single request through the pooled web client", long_about = None)]
struct Cli {
    /// HTTP method (GET, POST, PUT, ...)
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Absolute URL
    url: String,

    /// Extra header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query argument, `key=value` (repeatable)
    #[arg(short, long = "query")]
    query: Vec<String>,

    /// JSON body
    #[arg(long, conflicts_with = "data")]
    json: Option<String>,

    /// Raw text body
    #[arg(short, long)]
    data: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 10.0)]
    timeout: f64,

    /// Disable connection reuse
    #[arg(long)]
    force_close: bool,

    /// Print response headers
    #[arg(short, long)]
    include: bool,
}

fn split_pair<'a>(raw: &'a str, sep: char, what: &str) -> Result<(&'a str, &'a str), String> {
    raw.split_once(sep)
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| format!("invalid {what} '{raw}'"))
}

fn build_options(cli: &Cli) -> Result<RequestOptions, Box<dyn std::error::Error>> {
    let mut options = RequestOptions::new();
    for raw in &cli.headers {
        let (name, value) = split_pair(raw, ':', "header")?;
        options = options.header(name, value);
    }
    for raw in &cli.query {
        let (key, value) = split_pair(raw, '=', "query argument")?;
        options = options.query(key, value);
    }
    if let Some(json) = &cli.json {
        let value: serde_json::Value = serde_json::from_str(json)?;
        options = options.json_value(value);
    } else if let Some(data) = &cli.data {
        options = options.text(data.clone());
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let options = build_options(&cli)?;

    let config = ClientConfig {
        request_timeout_secs: cli.timeout,
        force_close: cli.force_close,
        ..ClientConfig::default()
    };
    let client = WebClient::new(config);

    let result = client.request(&cli.method, &cli.url, options).await;
    client.close(true).await;

    let response = match result {
        Ok(response) => response,
        Err(ClientError::Timeout(after)) => {
            eprintln!("Error: request timed out after {after:?}");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    println!("{} {}", response.method(), response.status());
    if cli.include {
        for (name, value) in response.headers().iter() {
            for v in value.all() {
                println!("{name}: {v}");
            }
        }
        println!();
    }
    match response.json() {
        Some(json) => println!("{}", serde_json::to_string_pretty(json)?),
        None => println!("{}", response.text()),
    }

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
