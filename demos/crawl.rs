use dhtcrawl::{Crawler, InfoHash, DEFAULT_CRAWL_TTL};
use std::{env, process, time::Duration};

const USAGE: &str = "usage: crawl <INFO_HASH> [TTL_SECONDS] [--benchmark]";

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let mut info_hash = None;
    let mut ttl = DEFAULT_CRAWL_TTL;
    let mut benchmark = false;

    for arg in env::args().skip(1) {
        if arg == "--benchmark" {
            benchmark = true;
        } else if info_hash.is_none() {
            info_hash = Some(arg.parse::<InfoHash>().unwrap_or_else(|error| {
                eprintln!("invalid info hash {arg:?}: {error}");
                process::exit(1)
            }));
        } else {
            ttl = arg.parse().map(Duration::from_secs).unwrap_or_else(|_| {
                eprintln!("{USAGE}");
                process::exit(1)
            });
        }
    }

    let info_hash = info_hash.unwrap_or_else(|| {
        eprintln!("{USAGE}");
        process::exit(1)
    });

    let crawler = match Crawler::builder().bind().await {
        Ok(crawler) => crawler,
        Err(error) => {
            eprintln!("failed to bind UDP socket: {error}");
            process::exit(1)
        }
    };

    match crawler.local_addr().await {
        Ok(addr) => println!(
            "crawling {} for {} seconds from {}...",
            info_hash,
            ttl.as_secs(),
            addr
        ),
        Err(error) => {
            eprintln!("crawler stopped unexpectedly: {error}");
            process::exit(1)
        }
    }

    let result = match crawler.crawl(info_hash, ttl, benchmark).await {
        Ok(result) => result,
        Err(error) => {
            eprintln!("crawl failed: {error}");
            process::exit(1)
        }
    };

    println!("found {} peers:", result.peers.len());
    for peer in &result.peers {
        println!("    {}", peer);
    }

    println!("met {} nodes", result.nodes.len());
}
