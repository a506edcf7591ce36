use std::env;
use std::error;

use reqwest::{Method, Url};

/// Checks a running gateway with a CORS preflight, which every path answers with 200.
fn main() -> Result<(), Box<dyn error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err("Missing URL argument".into());
    }

    let url = Url::parse(&args[1])?;

    let res = reqwest::blocking::Client::new()
        .request(Method::OPTIONS, url)
        .send()?;
    if !res.status().is_success() {
        return Err(format!("Preflight failed with status {}", res.status()).into());
    }

    Ok(())
}
