// Queries site and user info concurrently (combined into one API call),
// then lists a few pages following continuation.
//
//     cargo run -p mwapi-client --example query_siteinfo -- en.wikipedia.org
//     cargo run -p mwapi-client --example query_siteinfo -- --log-dir logs en.wikipedia.org

use futures::StreamExt;
use mwapi_client::{logging, params, ParamValue, RequestOptions, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let mut log_dir = None;
    let mut endpoint = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log-dir" => log_dir = Some(args.next().ok_or_else(|| anyhow::anyhow!("--log-dir needs a directory"))?),
            _ => endpoint = Some(arg),
        }
    }

    let _log_guard = match log_dir {
        Some(dir) => Some(logging::init_logging(dir, "query_siteinfo")?),
        None => {
            logging::init_test_logging();
            None
        }
    };

    let endpoint = endpoint.unwrap_or_else(|| "en.wikipedia.org".to_string());
    let session = Session::builder(endpoint)
        .user_agent("mwapi-rs-example/0.1 (https://github.com/currentspace/mwapi-rs)")
        .default_param("formatversion", 2)
        .build()?;

    let (siteinfo, userinfo) = tokio::join!(
        session.request(
            params! {"action" => "query", "meta" => ParamValue::set(["siteinfo"])},
            RequestOptions::new()
        ),
        session.request(
            params! {"action" => "query", "meta" => ParamValue::set(["userinfo"])},
            RequestOptions::new()
        ),
    );
    println!("Site name: {}", siteinfo?["query"]["general"]["sitename"]);
    println!("User: {}", userinfo?["query"]["userinfo"]["name"]);

    let mut pages = session
        .request_and_continue(
            params! {"action" => "query", "list" => "allpages", "aplimit" => 5},
            RequestOptions::new(),
        )
        .take(3);
    while let Some(response) = pages.next().await {
        for page in response?["query"]["allpages"].as_array().into_iter().flatten() {
            println!("  {}", page["title"]);
        }
    }

    Ok(())
}
