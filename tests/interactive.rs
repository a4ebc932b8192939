use std::error::Error;
use std::io::{self, Write};

use oddsfetch_rs::{
    DEFAULT_ENV_PREFIX,
    FetchConfig,
    OddsFetcher,
    OddsParser,
    ParseError,
    VERSION,
    modules::{CircuitBreakerConfig, CircuitBreakerRegistry, ProxyConfig, ProxyPool},
};
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::runtime::Runtime;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_u32(input: &str, default: u32) -> u32 {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

/// Counts top-level JSON array items and `<a>` links; good enough to see
/// which tier answered.
struct LinkParser;

impl OddsParser for LinkParser {
    type Record = String;

    fn parse_api(&self, payload: &Value) -> Result<Vec<String>, ParseError> {
        let items = match payload {
            Value::Array(items) => items.clone(),
            Value::Object(fields) => fields
                .values()
                .find_map(|value| value.as_array().cloned())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(items.iter().map(Value::to_string).collect())
    }

    fn parse_html(&self, document: &Html) -> Result<Vec<String>, ParseError> {
        let links = Selector::parse("a").map_err(|_| ParseError::new("bad selector"))?;
        Ok(document
            .select(&links)
            .filter_map(|link| link.value().attr("href"))
            .map(str::to_string)
            .collect())
    }
}

#[test]
#[ignore = "Requires network access and manual input"]
fn interactive_fetch_chain() -> Result<(), Box<dyn Error>> {
    println!("oddsfetch-rs {} interactive smoke test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let base_input = prompt("Base URL [https://example.com]:")?;
    let base_url = if base_input.is_empty() {
        "https://example.com".to_string()
    } else {
        base_input
    };
    let api_answer = prompt("API endpoint (blank to skip the API tier):")?;
    let path_answer = prompt("Sport path [/]:")?;
    let proxies_answer = prompt("Proxy list (comma separated, blank for none):")?;
    let retries_answer = prompt("Max retries [3]:")?;

    let mut config = FetchConfig::new("interactive", base_url);
    config.apply_env_overrides(DEFAULT_ENV_PREFIX)?;
    config.max_retries = parse_u32(&retries_answer, config.max_retries);
    config.proxies.extend(
        proxies_answer
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
    );

    let fetcher = OddsFetcher::builder()
        .with_config(config)
        .with_parser(LinkParser)
        .build()?;
    let runtime = Runtime::new()?;

    let api = (!api_answer.is_empty()).then_some(api_answer.as_str());
    let path = if path_answer.is_empty() { "/" } else { path_answer.as_str() };

    println!("\nFetching...");
    let records = runtime.block_on(fetcher.session(|f| async move { f.get_odds(api, path).await }))?;
    println!("Records: {}", records.len());
    for record in records.iter().take(10) {
        println!("  {}", record);
    }

    let snapshot = fetcher.metrics_snapshot();
    println!("\nMetrics:\n{}", serde_json::to_string_pretty(&snapshot)?);

    exercise_supporting_modules();

    println!("Interactive test complete. Re-run with different inputs as needed.");
    Ok(())
}

fn exercise_supporting_modules() {
    println!("\n--- Exercising supporting modules ---");

    let mut pool = ProxyPool::with_proxies(
        ProxyConfig {
            max_failures: 1,
            ..ProxyConfig::default()
        },
        ["http://127.0.0.1:8080", "http://127.0.0.1:9090"],
    );
    if let Some(proxy) = pool.get() {
        pool.mark_failed(&proxy);
    }
    let stats = pool.stats();
    println!("Proxy pool -> {:?}", stats);

    let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 1,
        ..CircuitBreakerConfig::default()
    });
    breakers.record_failure("api:/smoke");
    println!("Breaker api:/smoke -> {:?}", breakers.state("api:/smoke"));
}
